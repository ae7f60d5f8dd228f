//! Memory consolidation: merge near-duplicates, reinforce emotionally salient
//! memories, and decay stale ones.
//!
//! The engine never mutates the caller's collection.  In dry-run mode it only
//! returns the plan; in commit mode it also returns the desired post-
//! consolidation memory set, leaving persistence to the caller's store.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use kindred_config::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::embedding::{cosine_similarity, is_usable};
use crate::error::MemoryError;
use crate::schema::MemoryNode;
use crate::timestamp::{age_days, parse_now};

/// Decay-factor boost granted to strengthened memories in commit mode.
const STRENGTHEN_DECAY_BOOST: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationOptions {
    pub dry_run: bool,
    pub merge_similarity_threshold: f64,
    pub decay_after_days: f64,
    pub emotional_strengthen_threshold: f64,
}

impl Default for ConsolidationOptions {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for ConsolidationOptions {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            dry_run: true,
            merge_similarity_threshold: config.merge_similarity_threshold,
            decay_after_days: config.decay_after_days,
            emotional_strengthen_threshold: config.emotional_strengthen_threshold,
        }
    }
}

impl ConsolidationOptions {
    fn validate(&self) -> Result<(), MemoryError> {
        let t = self.merge_similarity_threshold;
        if !t.is_finite() || !(-1.0..=1.0).contains(&t) {
            return Err(MemoryError::InvalidOption {
                name: "merge_similarity_threshold",
                value: t,
            });
        }
        let d = self.decay_after_days;
        if !d.is_finite() || d < 0.0 {
            return Err(MemoryError::InvalidOption {
                name: "decay_after_days",
                value: d,
            });
        }
        let e = self.emotional_strengthen_threshold;
        if !e.is_finite() || !(0.0..=1.0).contains(&e) {
            return Err(MemoryError::InvalidOption {
                name: "emotional_strengthen_threshold",
                value: e,
            });
        }
        Ok(())
    }
}

/// One group of near-duplicates folded into its earliest-created member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergePlan {
    pub surviving_id: String,
    pub merged_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSummary {
    pub total_input: usize,
    pub total_output: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub dry_run: bool,
    pub merges: Vec<MergePlan>,
    pub strengthened_ids: Vec<String>,
    pub decayed_ids: Vec<String>,
    pub summary: ConsolidationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationOutcome {
    pub report: ConsolidationReport,
    /// Desired memory set after consolidation.  `None` in dry-run mode.
    pub memories: Option<Vec<MemoryNode>>,
}

pub fn consolidate(
    memories: &[MemoryNode],
    now_iso: &str,
    options: ConsolidationOptions,
) -> Result<ConsolidationOutcome, MemoryError> {
    options.validate()?;
    let now = parse_now(now_iso)?;
    let created: Vec<DateTime<Utc>> = memories
        .iter()
        .map(MemoryNode::created_at)
        .collect::<Result<_, _>>()?;
    check_dimensions(memories)?;

    // ── 1. Merge groups ───────────────────────────────────────────────────
    let groups = similarity_groups(memories, options.merge_similarity_threshold);

    let mut merges = Vec::new();
    let mut in_plan = HashSet::new();
    let mut merged_away = HashSet::new();
    let mut survivor_of: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for members in groups.into_iter().filter(|g| g.len() > 1) {
        let survivor = members
            .iter()
            .copied()
            .min_by(|&a, &b| created[a].cmp(&created[b]).then(a.cmp(&b)))
            .unwrap_or(members[0]);
        let folded: Vec<usize> = members.iter().copied().filter(|&i| i != survivor).collect();
        in_plan.extend(members.iter().copied());
        merged_away.extend(folded.iter().copied());
        debug!(
            surviving_id = %memories[survivor].id,
            merged = folded.len(),
            "consolidation: merge group"
        );
        survivor_of.insert(survivor, folded);
    }
    for (&survivor, folded) in &survivor_of {
        merges.push(MergePlan {
            surviving_id: memories[survivor].id.clone(),
            merged_ids: folded.iter().map(|&i| memories[i].id.clone()).collect(),
        });
    }

    // ── 2. Strengthen ─────────────────────────────────────────────────────
    let strengthened: Vec<usize> = (0..memories.len())
        .filter(|i| !merged_away.contains(i))
        .filter(|&i| memories[i].salience() >= options.emotional_strengthen_threshold)
        .collect();
    let strengthened_set: HashSet<usize> = strengthened.iter().copied().collect();

    // ── 3. Decay ──────────────────────────────────────────────────────────
    let decayed: Vec<usize> = (0..memories.len())
        .filter(|i| !in_plan.contains(i) && !strengthened_set.contains(i))
        .filter(|&i| age_days(now, created[i]) > options.decay_after_days)
        .collect();
    let decayed_set: HashSet<usize> = decayed.iter().copied().collect();

    let total_input = memories.len();
    let total_output = total_input - merged_away.len() - decayed.len();

    let report = ConsolidationReport {
        dry_run: options.dry_run,
        merges,
        strengthened_ids: strengthened.iter().map(|&i| memories[i].id.clone()).collect(),
        decayed_ids: decayed.iter().map(|&i| memories[i].id.clone()).collect(),
        summary: ConsolidationSummary {
            total_input,
            total_output,
        },
    };

    info!(
        dry_run = options.dry_run,
        total_input,
        total_output,
        merges = report.merges.len(),
        strengthened = report.strengthened_ids.len(),
        decayed = report.decayed_ids.len(),
        "memory consolidation complete"
    );

    if options.dry_run {
        return Ok(ConsolidationOutcome {
            report,
            memories: None,
        });
    }

    let mut next = Vec::with_capacity(total_output);
    for (i, memory) in memories.iter().enumerate() {
        if merged_away.contains(&i) || decayed_set.contains(&i) {
            continue;
        }
        let mut node = memory.clone();
        if let Some(folded) = survivor_of.get(&i) {
            absorb(&mut node, folded.iter().map(|&j| &memories[j]));
        }
        if strengthened_set.contains(&i) {
            node.access_count = node.access_count.saturating_add(1);
            node.decay_factor = (finite_or(node.decay_factor, 1.0) + STRENGTHEN_DECAY_BOOST).min(1.0);
        }
        next.push(node);
    }

    Ok(ConsolidationOutcome {
        report,
        memories: Some(next),
    })
}

/// Every usable embedding must share one length.
fn check_dimensions(memories: &[MemoryNode]) -> Result<(), MemoryError> {
    let mut expected = None;
    for memory in memories.iter().filter(|m| is_usable(&m.embedding)) {
        match expected {
            None => expected = Some(memory.embedding.len()),
            Some(len) if len != memory.embedding.len() => {
                return Err(MemoryError::EmbeddingDimensionMismatch {
                    id: memory.id.clone(),
                    expected: len,
                    found: memory.embedding.len(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Connected components of the "similar enough" relation, so transitively
/// overlapping pairs land in the same group.  Members keep input order.
fn similarity_groups(memories: &[MemoryNode], threshold: f64) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..memories.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let usable: Vec<bool> = memories.iter().map(|m| is_usable(&m.embedding)).collect();
    for i in 0..memories.len() {
        if !usable[i] {
            continue;
        }
        for j in (i + 1)..memories.len() {
            if !usable[j] {
                continue;
            }
            let similarity = cosine_similarity(&memories[i].embedding, &memories[j].embedding);
            if similarity >= threshold {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..memories.len() {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }
    groups.into_values().collect()
}

fn absorb<'a>(survivor: &mut MemoryNode, folded: impl Iterator<Item = &'a MemoryNode>) {
    let mut merged_from = Vec::new();
    for other in folded {
        survivor.access_count = survivor.access_count.saturating_add(other.access_count);
        survivor.decay_factor = finite_or(survivor.decay_factor, 1.0)
            .max(finite_or(other.decay_factor, 1.0))
            .min(1.0);
        for link in &other.provenance {
            if !survivor
                .provenance
                .iter()
                .any(|existing| existing.message_id == link.message_id)
            {
                survivor.provenance.push(link.clone());
            }
        }
        merged_from.push(serde_json::Value::String(other.id.clone()));
    }
    survivor
        .metadata
        .insert("merged_from".to_string(), serde_json::Value::Array(merged_from));
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
