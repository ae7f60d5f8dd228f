//! Memory retrieval.
//!
//! Scoring model (weights sum to 1.0, defaults shown):
//! ```text
//! score = semantic(0.40) + recency(0.30) + emotional(0.20) + frequency(0.10)
//! ```
//! * semantic  = (cos(candidate, query) + 1) / 2, or 0 for unusable vectors
//! * recency   = 1 / (1 + age_days / 14)
//! * emotional = |valence|
//! * frequency = log10(max(1, access_count) + 1) / log10(101)
//!
//! Candidates without a usable embedding are still ranked (semantic = 0) and
//! are counted in [`RetrievalResult::discarded_without_embedding`].
use kindred_config::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::embedding::{compute_semantic_score, is_usable};
use crate::error::MemoryError;
use crate::schema::MemoryNode;
use crate::timestamp::{Timestamp, age_days, format_iso, parse_now};

/// Recency half-life style constant: a two-week-old memory scores 0.5.
const RECENCY_SCALE_DAYS: f64 = 14.0;
/// Tolerance used when checking that weights sum to one.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalWeights {
    pub semantic: f64,
    pub recency: f64,
    pub emotional: f64,
    pub frequency: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            recency: 0.3,
            emotional: 0.2,
            frequency: 0.1,
        }
    }
}

impl From<&MemoryConfig> for RetrievalWeights {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            semantic: config.semantic_weight,
            recency: config.recency_weight,
            emotional: config.emotional_weight,
            frequency: config.frequency_weight,
        }
    }
}

impl RetrievalWeights {
    pub fn validate(&self) -> Result<(), MemoryError> {
        for (name, value) in [
            ("semantic", self.semantic),
            ("recency", self.recency),
            ("emotional", self.emotional),
            ("frequency", self.frequency),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MemoryError::InvalidWeight { name, value });
            }
        }
        let sum = self.semantic + self.recency + self.emotional + self.frequency;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(MemoryError::WeightsDoNotSumToOne { sum });
        }
        Ok(())
    }

    /// Human-readable scoring formula with the weights filled in.
    pub fn formula(&self) -> String {
        format!(
            "score = {:.2}*semantic + {:.2}*recency + {:.2}*emotional + {:.2}*frequency",
            self.semantic, self.recency, self.emotional, self.frequency
        )
    }

    fn apply(&self, b: &SignalBreakdown) -> f64 {
        (b.semantic * self.semantic
            + b.recency * self.recency
            + b.emotional * self.emotional
            + b.frequency * self.frequency)
            .clamp(0.0, 1.0)
    }
}

/// Per-signal contributions, each in `[0, 1]` before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub semantic: f64,
    pub recency: f64,
    pub emotional: f64,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryNode,
    pub score: f64,
    pub breakdown: SignalBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Sorted by descending score; ties keep candidate order.
    pub selected: Vec<ScoredMemory>,
    pub weights: RetrievalWeights,
    pub formula: String,
    pub discarded_without_embedding: usize,
}

/// Rank `candidates` against `query_embedding` and return the top `limit`.
///
/// Accepts a slice so the caller's memory snapshot is never copied wholesale;
/// only the winning entries are cloned into the result.
pub fn retrieve(
    candidates: &[MemoryNode],
    query_embedding: &[f64],
    now_iso: &str,
    limit: usize,
    weights: Option<RetrievalWeights>,
) -> Result<RetrievalResult, MemoryError> {
    let weights = weights.unwrap_or_default();
    weights.validate()?;
    let now = parse_now(now_iso)?;

    let query_usable = is_usable(query_embedding);
    let mut discarded_without_embedding = 0;

    let mut ranked: Vec<(&MemoryNode, String, f64, SignalBreakdown)> =
        Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let usable = is_usable(&candidate.embedding);
        if !usable {
            discarded_without_embedding += 1;
        } else if query_usable && candidate.embedding.len() != query_embedding.len() {
            return Err(MemoryError::EmbeddingDimensionMismatch {
                id: candidate.id.clone(),
                expected: query_embedding.len(),
                found: candidate.embedding.len(),
            });
        }

        let created_at = candidate.created_at()?;
        let breakdown = SignalBreakdown {
            semantic: compute_semantic_score(&candidate.embedding, query_embedding),
            recency: recency_score(age_days(now, created_at)),
            emotional: candidate.salience(),
            frequency: frequency_score(candidate.access_count),
        };
        let score = weights.apply(&breakdown);
        trace!(id = %candidate.id, score, ?breakdown, "scored memory node");
        ranked.push((candidate, format_iso(created_at), score, breakdown));
    }

    // `sort_by` is stable, so equal scores keep candidate order.
    ranked.sort_by(|(_, _, left, _), (_, _, right, _)| right.total_cmp(left));

    let selected: Vec<ScoredMemory> = ranked
        .into_iter()
        .take(limit)
        .map(|(memory, timestamp_iso, score, breakdown)| {
            let mut memory = memory.clone();
            memory.timestamp = Timestamp::Iso(timestamp_iso);
            ScoredMemory {
                memory,
                score,
                breakdown,
            }
        })
        .collect();

    debug!(
        candidates = candidates.len(),
        selected = selected.len(),
        discarded_without_embedding,
        "memory retrieval complete"
    );

    Ok(RetrievalResult {
        selected,
        weights,
        formula: weights.formula(),
        discarded_without_embedding,
    })
}

// ── Signals ───────────────────────────────────────────────────────────────────

pub fn recency_score(age_days: f64) -> f64 {
    (1.0 / (1.0 + age_days.max(0.0) / RECENCY_SCALE_DAYS)).clamp(0.0, 1.0)
}

pub fn frequency_score(access_count: u64) -> f64 {
    let count = access_count.max(1) as f64;
    ((count + 1.0).log10() / 101_f64.log10()).clamp(0.0, 1.0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::embed;
    use crate::schema::MemoryKind;

    const NOW: &str = "2025-06-01T00:00:00.000Z";

    fn node(id: &str, content: &str, timestamp: &str) -> MemoryNode {
        MemoryNode::new(id, "user-1", MemoryKind::Semantic, content, timestamp)
            .with_embedding(embed(content, 64))
    }

    #[test]
    fn default_weights_validate_and_render_formula() {
        let w = RetrievalWeights::default();
        w.validate().unwrap();
        assert_eq!(
            w.formula(),
            "score = 0.40*semantic + 0.30*recency + 0.20*emotional + 0.10*frequency"
        );
    }

    #[test]
    fn invalid_weights_fail_fast() {
        let lopsided = RetrievalWeights {
            semantic: 0.9,
            ..Default::default()
        };
        assert!(matches!(
            retrieve(&[], &[1.0], NOW, 3, Some(lopsided)),
            Err(MemoryError::WeightsDoNotSumToOne { .. })
        ));

        let negative = RetrievalWeights {
            semantic: -0.1,
            recency: 0.5,
            emotional: 0.4,
            frequency: 0.2,
        };
        assert!(matches!(
            negative.validate(),
            Err(MemoryError::InvalidWeight { name: "semantic", .. })
        ));

        let nan = RetrievalWeights {
            frequency: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn signal_formulas_match_reference_values() {
        assert!((recency_score(0.0) - 1.0).abs() < 1e-12);
        assert!((recency_score(14.0) - 0.5).abs() < 1e-12);
        assert!((recency_score(-3.0) - 1.0).abs() < 1e-12);
        // access_count 0 and 1 both count as one access.
        assert_eq!(frequency_score(0), frequency_score(1));
        assert!((frequency_score(100) - 1.0).abs() < 1e-12);
        assert!(frequency_score(10_000) <= 1.0);
    }

    #[test]
    fn semantic_match_ranks_first_and_selection_is_sorted() {
        let candidates = vec![
            node("a", "weekend hiking trip to the alps", "2025-05-31T00:00:00Z"),
            node("b", "the user's sister is called Maya", "2025-05-31T00:00:00Z"),
            node("c", "favourite pizza topping is anchovies", "2025-05-31T00:00:00Z"),
        ];
        let query = embed("what is my sister called", 64);
        let result = retrieve(&candidates, &query, NOW, 2, None).unwrap();

        assert_eq!(result.selected.len(), 2);
        assert_eq!(result.selected[0].memory.id, "b");
        assert!(result.selected.windows(2).all(|w| w[0].score >= w[1].score));
        for item in &result.selected {
            assert!((0.0..=1.0).contains(&item.score));
            let b = item.breakdown;
            for signal in [b.semantic, b.recency, b.emotional, b.frequency] {
                assert!((0.0..=1.0).contains(&signal));
            }
        }
    }

    #[test]
    fn unusable_embeddings_are_counted_but_still_ranked() {
        let mut missing = node("missing", "no vector here", "2025-05-31T00:00:00Z");
        missing.embedding.clear();
        missing.emotional_valence = -1.0;
        let mut zeroed = node("zeroed", "zero vector", "2025-05-31T00:00:00Z");
        zeroed.embedding = vec![0.0; 64];
        let ok = node("ok", "plain memory", "2025-05-31T00:00:00Z");

        let query = embed("plain memory", 64);
        let result = retrieve(&[missing, zeroed, ok], &query, NOW, 10, None).unwrap();

        assert_eq!(result.discarded_without_embedding, 2);
        assert_eq!(result.selected.len(), 3);
        let missing = result
            .selected
            .iter()
            .find(|s| s.memory.id == "missing")
            .unwrap();
        assert_eq!(missing.breakdown.semantic, 0.0);
        assert_eq!(missing.breakdown.emotional, 1.0);
    }

    #[test]
    fn mismatched_embedding_length_is_rejected() {
        let short = MemoryNode::new("s", "u", MemoryKind::Episodic, "x", NOW)
            .with_embedding(vec![1.0, 0.0]);
        let err = retrieve(&[short], &embed("x", 64), NOW, 1, None).unwrap_err();
        assert_eq!(
            err,
            MemoryError::EmbeddingDimensionMismatch {
                id: "s".to_string(),
                expected: 64,
                found: 2,
            }
        );
    }

    #[test]
    fn ties_keep_candidate_order_and_limit_is_respected() {
        let candidates: Vec<MemoryNode> = (0..6)
            .map(|i| {
                MemoryNode::new(format!("n{i}"), "u", MemoryKind::Episodic, "same", NOW)
            })
            .collect();
        let result = retrieve(&candidates, &[], NOW, 4, None).unwrap();
        let ids: Vec<&str> = result.selected.iter().map(|s| s.memory.id.as_str()).collect();
        assert_eq!(ids, vec!["n0", "n1", "n2", "n3"]);
        assert_eq!(result.discarded_without_embedding, 6);
    }

    #[test]
    fn numeric_and_iso_timestamps_score_identically() {
        let iso = node("iso", "same content", "2025-05-25T00:00:00.000Z");
        let mut secs = iso.clone();
        secs.id = "secs".into();
        secs.timestamp = crate::Timestamp::Unix(1_748_131_200.0);
        let mut millis = iso.clone();
        millis.id = "millis".into();
        millis.timestamp = crate::Timestamp::Unix(1_748_131_200_000.0);

        let query = embed("same content", 64);
        let result = retrieve(&[iso, secs, millis], &query, NOW, 3, None).unwrap();
        let scores: Vec<u64> = result.selected.iter().map(|s| s.score.to_bits()).collect();
        assert!(scores.iter().all(|s| *s == scores[0]));
    }

    #[test]
    fn selected_memories_carry_iso_timestamps() {
        let mut secs = node("secs", "tea with milk", NOW);
        secs.timestamp = Timestamp::Unix(1_748_131_200.0);
        let mut dated = node("dated", "tea with lemon", NOW);
        dated.timestamp = Timestamp::from_datetime(parse_now("2025-05-20T08:30:00Z").unwrap());

        let query = embed("tea", 64);
        let result = retrieve(&[secs, dated], &query, NOW, 2, None).unwrap();
        for scored in &result.selected {
            assert!(matches!(scored.memory.timestamp, Timestamp::Iso(_)));
        }
        let json = serde_json::to_value(&result).unwrap();
        let stamps: Vec<&str> = json["selected"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["memory"]["timestamp"].as_str().unwrap())
            .collect();
        assert!(stamps.contains(&"2025-05-25T00:00:00.000Z"));
        assert!(stamps.contains(&"2025-05-20T08:30:00.000Z"));
    }

    #[test]
    fn retrieval_is_bit_identical_across_runs() {
        let candidates = vec![
            node("a", "gym on tuesdays", "2025-04-01T00:00:00Z").with_valence(0.4),
            node("b", "hates cilantro", "2025-05-20T08:00:00Z").with_valence(-0.9),
            node("c", "learning the cello", "2025-01-15T00:00:00Z"),
        ];
        let query = embed("cello practice", 64);
        let first = retrieve(&candidates, &query, NOW, 3, None).unwrap();
        let second = retrieve(&candidates, &query, NOW, 3, None).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn invalid_clock_value_is_rejected() {
        assert!(matches!(
            retrieve(&[], &[], "not a date", 1, None),
            Err(MemoryError::InvalidTimestamp { .. })
        ));
    }
}
