use std::collections::{BTreeSet, HashSet};

use kindred_config::PersonaConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aspect::{PersonaAspect, estimate_tokens, terms};

/// Weight of the relational boost: `0.05 × Σ outgoing edge weights`.
const RELATIONAL_BOOST: f64 = 0.05;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersonaError {
    #[error("duplicate persona aspect id `{0}`")]
    DuplicateAspect(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaGraphNode {
    pub id: String,
    pub title: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub estimated_tokens: usize,
}

/// Directed edge.  Edges are created in symmetric pairs and only where the
/// two aspects share at least one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaGraphEdge {
    pub from: String,
    pub to: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBudget {
    pub token_budget: usize,
    pub limit: usize,
}

impl Default for SelectionBudget {
    fn default() -> Self {
        Self::from(&PersonaConfig::default())
    }
}

impl From<&PersonaConfig> for SelectionBudget {
    fn from(config: &PersonaConfig) -> Self {
        Self {
            token_budget: config.token_budget,
            limit: config.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSelection {
    pub nodes: Vec<PersonaGraphNode>,
    pub total_estimated_tokens: usize,
    /// True when nothing matched the query and the smallest aspects were
    /// returned instead.
    pub fallback: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PersonaGraphStore {
    nodes: Vec<PersonaGraphNode>,
    node_terms: Vec<BTreeSet<String>>,
    edges: Vec<PersonaGraphEdge>,
    /// Σ outgoing edge weight per node, indexed like `nodes`.
    out_weight: Vec<f64>,
}

impl PersonaGraphStore {
    /// Build the graph with O(n²) pairwise Jaccard overlap of aspect terms.
    pub fn from_aspects(aspects: &[PersonaAspect]) -> Result<Self, PersonaError> {
        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(aspects.len());
        let mut node_terms = Vec::with_capacity(aspects.len());
        for aspect in aspects {
            if !seen.insert(aspect.id.as_str()) {
                return Err(PersonaError::DuplicateAspect(aspect.id.clone()));
            }
            let text = format!(
                "{} {} {}",
                aspect.title,
                aspect.content,
                aspect.keywords.join(" ")
            );
            node_terms.push(terms(&text));
            nodes.push(PersonaGraphNode {
                id: aspect.id.clone(),
                title: aspect.title.clone(),
                content: aspect.content.clone(),
                keywords: aspect.keywords.clone(),
                estimated_tokens: aspect.estimated_tokens.unwrap_or_else(|| {
                    estimate_tokens(&format!("{}\n{}", aspect.title, aspect.content))
                }),
            });
        }

        let mut edges = Vec::new();
        let mut out_weight = vec![0.0; nodes.len()];
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let weight = jaccard(&node_terms[i], &node_terms[j]);
                if weight <= 0.0 {
                    continue;
                }
                edges.push(PersonaGraphEdge {
                    from: nodes[i].id.clone(),
                    to: nodes[j].id.clone(),
                    weight,
                });
                edges.push(PersonaGraphEdge {
                    from: nodes[j].id.clone(),
                    to: nodes[i].id.clone(),
                    weight,
                });
                out_weight[i] += weight;
                out_weight[j] += weight;
            }
        }

        debug!(nodes = nodes.len(), edges = edges.len(), "persona graph built");
        Ok(Self {
            nodes,
            node_terms,
            edges,
            out_weight,
        })
    }

    pub fn nodes(&self) -> &[PersonaGraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[PersonaGraphEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Relevance score of every node for `query`, indexed like [`Self::nodes`].
    ///
    /// Direct overlap is the share of query terms found in the node.  Nodes
    /// with direct overlap also receive the relational boost; nodes without
    /// it score zero so that well-connected but unrelated aspects never
    /// crowd out the fallback.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return vec![0.0; self.nodes.len()];
        }
        self.node_terms
            .iter()
            .zip(&self.out_weight)
            .map(|(node_terms, out)| {
                let hits = query_terms.intersection(node_terms).count();
                if hits == 0 {
                    return 0.0;
                }
                hits as f64 / query_terms.len() as f64 + RELATIONAL_BOOST * out
            })
            .collect()
    }

    /// Greedy budget-constrained selection of the aspects most relevant to
    /// `query`.  Never returns an empty selection for a non-empty graph.
    ///
    /// Aspects are walked in score order. One that does not fit the remaining
    /// budget is skipped and the walk continues with lower-ranked aspects, so
    /// a single oversized aspect cannot starve the prompt. The walk stops once
    /// `limit` aspects are picked or the budget is used up exactly.
    pub fn retrieve_relevant(&self, query: &str, budget: SelectionBudget) -> PersonaSelection {
        let scores = self.score(query);
        let mut ranked: Vec<usize> = (0..self.nodes.len()).filter(|&i| scores[i] > 0.0).collect();
        // Stable sort: equal scores keep aspect order.
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let fallback = ranked.is_empty();
        if fallback {
            ranked = (0..self.nodes.len()).collect();
            ranked.sort_by_key(|&i| self.nodes[i].estimated_tokens);
        }

        let mut picked = Vec::new();
        let mut remaining = budget.token_budget;
        for i in ranked.iter().copied() {
            if picked.len() >= budget.limit || remaining == 0 {
                break;
            }
            let cost = self.nodes[i].estimated_tokens;
            if cost <= remaining {
                remaining -= cost;
                picked.push(i);
            }
        }
        // The caller always gets some context, even if it overshoots a tiny budget.
        if fallback && picked.is_empty() && budget.limit > 0 {
            if let Some(&smallest) = ranked.first() {
                picked.push(smallest);
            }
        }

        let nodes: Vec<PersonaGraphNode> = picked.iter().map(|&i| self.nodes[i].clone()).collect();
        let total_estimated_tokens = nodes.iter().map(|n| n.estimated_tokens).sum();
        debug!(
            selected = nodes.len(),
            total_estimated_tokens,
            fallback,
            "persona aspects selected"
        );
        PersonaSelection {
            nodes,
            total_estimated_tokens,
            fallback,
        }
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
