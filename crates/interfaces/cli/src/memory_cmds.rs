use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use kindred_config::AppConfig;
use kindred_memory::recall::{RecallScenario, run_recall_benchmark};
use kindred_memory::schema::truncate_str;
use kindred_memory::{ConsolidationOptions, MemoryNode, RetrievalWeights, consolidate, embed, retrieve};

pub(crate) fn load_memories(path: &Path) -> Result<Vec<MemoryNode>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read memories from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse memories in {}", path.display()))
}

pub(crate) fn run_retrieve(
    config: &AppConfig,
    memories_path: &Path,
    query: &str,
    now: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let memories = load_memories(memories_path)?;
    let query_embedding = embed(query, config.memory.embedding_dimensions);
    let result = retrieve(
        &memories,
        &query_embedding,
        now,
        limit.unwrap_or(config.memory.retrieval_limit),
        Some(RetrievalWeights::from(&config.memory)),
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("── retrieval ────────────────────────────────────────");
    println!("  formula    : {}", result.formula);
    println!("  candidates : {}", memories.len());
    println!("  no embedding: {}", result.discarded_without_embedding);
    for (rank, scored) in result.selected.iter().enumerate() {
        let b = &scored.breakdown;
        println!(
            "  {:>2}. {:.3}  [sem {:.2} rec {:.2} emo {:.2} freq {:.2}]  {}  {}",
            rank + 1,
            scored.score,
            b.semantic,
            b.recency,
            b.emotional,
            b.frequency,
            scored.memory.id_short(),
            truncate_str(&scored.memory.content, 60),
        );
    }
    Ok(())
}

pub(crate) fn run_consolidate(
    config: &AppConfig,
    memories_path: &Path,
    now: &str,
    commit: bool,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let memories = load_memories(memories_path)?;
    let options = ConsolidationOptions {
        dry_run: !commit,
        ..ConsolidationOptions::from(&config.memory)
    };
    let outcome = consolidate(&memories, now, options)?;

    if let (Some(path), Some(next)) = (out, outcome.memories.as_ref()) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(next)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        return Ok(());
    }

    let report = &outcome.report;
    println!("── consolidation ────────────────────────────────────");
    println!("  mode        : {}", if report.dry_run { "dry-run" } else { "commit" });
    println!("  input       : {}", report.summary.total_input);
    println!("  output      : {}", report.summary.total_output);
    for plan in &report.merges {
        println!("  merge       : {} ← {}", plan.surviving_id, plan.merged_ids.join(", "));
    }
    if !report.strengthened_ids.is_empty() {
        println!("  strengthened: {}", report.strengthened_ids.join(", "));
    }
    if !report.decayed_ids.is_empty() {
        println!("  decayed     : {}", report.decayed_ids.join(", "));
    }
    if let Some(path) = out {
        if outcome.memories.is_some() {
            println!("  written to  : {}", path.display());
        } else {
            println!("  (dry-run: {} not written; pass --commit)", path.display());
        }
    }
    Ok(())
}

pub(crate) fn run_recall_bench(scenario: RecallScenario, target: f64, json: bool) -> Result<()> {
    let report = run_recall_benchmark(&scenario)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("── recall benchmark ─────────────────────────────────");
        println!("  facts   : {}", report.fact_count);
        println!("  turns   : {}", scenario.turns);
        println!("  limit   : {}", scenario.limit);
        println!("  hits    : {}", report.hits);
        println!("  recall  : {:.2} (target {:.2})", report.recall_rate, target);
        if !report.missed_anchors.is_empty() {
            println!("  missed  : {}", report.missed_anchors.join(", "));
        }
    }
    if report.recall_rate < target {
        bail!(
            "recall {:.2} is below the target {:.2}",
            report.recall_rate,
            target
        );
    }
    Ok(())
}
