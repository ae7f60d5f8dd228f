//! Synthetic recall benchmark.
//!
//! Plants `fact_count` facts, each carrying a unique anchor token, among
//! `turns` conversation memories, then queries every anchor and checks whether
//! its fact lands in the top `limit` results.  Fully deterministic: same
//! scenario → same report.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::embed;
use crate::error::MemoryError;
use crate::retrieval::{RetrievalWeights, retrieve};
use crate::schema::{MemoryKind, MemoryNode};
use crate::timestamp::format_iso;

const NOISE_TOPICS: &[&str] = &[
    "weather", "breakfast", "traffic", "podcast", "laundry", "emails", "groceries",
    "football", "movie", "garden", "coffee", "meeting", "playlist", "bus", "recipe",
    "weekend", "neighbours", "homework", "museum", "rain",
];

const FACT_OBJECTS: &[&str] = &[
    "violin", "passport", "telescope", "umbrella", "notebook", "bicycle", "lantern",
    "compass", "kettle", "camera",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallScenario {
    pub fact_count: usize,
    pub turns: usize,
    pub limit: usize,
    pub dimensions: usize,
}

impl Default for RecallScenario {
    fn default() -> Self {
        Self {
            fact_count: 20,
            turns: 100,
            limit: 3,
            dimensions: crate::embedding::DEFAULT_DIMENSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallReport {
    pub fact_count: usize,
    pub hits: usize,
    pub recall_rate: f64,
    /// Anchors whose fact did not make the top `limit`.
    pub missed_anchors: Vec<String>,
}

fn anchor(index: usize) -> String {
    format!("zq{index:03}anchor")
}

/// Build the memory set for `scenario` relative to `start`.
///
/// Returns the memories and, for each planted fact, `(anchor, memory id)`.
pub fn build_corpus(
    scenario: &RecallScenario,
    start: DateTime<Utc>,
) -> (Vec<MemoryNode>, Vec<(String, String)>) {
    let turns = scenario.turns.max(scenario.fact_count);
    let stride = if scenario.fact_count == 0 {
        usize::MAX
    } else {
        (turns / scenario.fact_count).max(1)
    };

    let mut memories = Vec::with_capacity(turns);
    let mut planted = Vec::with_capacity(scenario.fact_count);
    for turn in 0..turns {
        let at = format_iso(start + Duration::minutes(turn as i64));
        let fact_index = turn / stride;
        let is_fact = turn % stride == 0 && fact_index < scenario.fact_count;
        let (id, content) = if is_fact {
            let anchor = anchor(fact_index);
            let object = FACT_OBJECTS[fact_index % FACT_OBJECTS.len()];
            let id = format!("fact-{fact_index:03}");
            planted.push((anchor.clone(), id.clone()));
            (id, format!("{anchor} the user keeps the {object} in the hallway cupboard"))
        } else {
            let a = NOISE_TOPICS[turn % NOISE_TOPICS.len()];
            let b = NOISE_TOPICS[(turn * 7 + 3) % NOISE_TOPICS.len()];
            (format!("turn-{turn:03}"), format!("we chatted about {a} and then {b}"))
        };
        let embedding = embed(&content, scenario.dimensions);
        memories.push(
            MemoryNode::new(id, "bench-user", MemoryKind::Episodic, content, at)
                .with_embedding(embedding),
        );
    }
    (memories, planted)
}

/// Run the benchmark with the default retrieval weights.
pub fn run_recall_benchmark(scenario: &RecallScenario) -> Result<RecallReport, MemoryError> {
    let start = DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default();
    let (memories, planted) = build_corpus(scenario, start);
    let now = format_iso(start + Duration::minutes(memories.len() as i64));

    let mut hits = 0;
    let mut missed_anchors = Vec::new();
    for (anchor, fact_id) in &planted {
        let query = embed(anchor, scenario.dimensions);
        let result = retrieve(
            &memories,
            &query,
            &now,
            scenario.limit,
            Some(RetrievalWeights::default()),
        )?;
        if result.selected.iter().any(|s| &s.memory.id == fact_id) {
            hits += 1;
        } else {
            missed_anchors.push(anchor.clone());
        }
    }

    let recall_rate = if planted.is_empty() {
        1.0
    } else {
        hits as f64 / planted.len() as f64
    };
    info!(
        facts = planted.len(),
        turns = memories.len(),
        hits,
        recall_rate,
        "recall benchmark complete"
    );

    Ok(RecallReport {
        fact_count: planted.len(),
        hits,
        recall_rate,
        missed_anchors,
    })
}
