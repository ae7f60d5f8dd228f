use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing::info;

use kindred_config::AppConfig;
use kindred_humanizer::{Availability, HumanizeRequest, HumanizedOutput, Humanizer, MoodState};
use kindred_memory::schema::truncate_str;
use kindred_memory::{MemoryNode, RetrievalWeights};
use kindred_persona::{PersonaAspect, PersonaGraphStore, SelectionBudget};
use kindred_runtime::{
    ConversationContext, EmitFn, GrowthEvent, HumanizerStage, LearnerPayload, LearnerStage,
    PersistFn, Pipeline, RunOptions, TurnInput, UpstreamStages, system_clock, uuid_ids,
};

use crate::demo_stages::{HeuristicEmotion, MemoryPrompt, PersonaIdentity, ScriptedLlm, StaticContext};
use crate::memory_cmds::load_memories;

pub(crate) fn load_aspects(path: &Path) -> Result<Vec<PersonaAspect>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read persona aspects from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse persona aspects in {}", path.display()))
}

fn availability(unavailable_ms: Option<u64>) -> Availability {
    match unavailable_ms {
        Some(ms) => Availability::unavailable(ms, "marked unavailable from the command line"),
        None => Availability::default(),
    }
}

fn print_humanized(output: &HumanizedOutput) {
    println!("── humanized reply ──────────────────────────────────");
    println!("  read receipt after {} ms", output.read_delay_ms);
    if output.strategic_non_response.should_delay {
        println!(
            "  holding back {} ms ({})",
            output.strategic_non_response.delay_ms, output.strategic_non_response.reason
        );
    }
    for (i, message) in output.messages.iter().enumerate() {
        println!(
            "  [{}] wait {:>5} ms, type {:>5} ms │ {}",
            i + 1,
            message.delay_before_ms,
            message.typing_duration_ms,
            message.text
        );
    }
    if output.revision.should_revise {
        println!(
            "  revision pause {} ms (score {:.2})",
            output.revision.pause_ms, output.revision.score
        );
    }
    println!("  total typing {} ms", output.total_typing_ms());
}

pub(crate) fn run_humanize(
    config: &AppConfig,
    text: &str,
    complexity: f64,
    unavailable_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let humanizer = Humanizer::new(config.humanizer.clone())?;
    let output = humanizer.humanize(&HumanizeRequest {
        text: text.to_string(),
        emotional_complexity: complexity,
        availability: availability(unavailable_ms),
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_humanized(&output);
    }
    Ok(())
}

pub(crate) fn run_persona(
    config: &AppConfig,
    aspects_path: &Path,
    query: &str,
    token_budget: Option<usize>,
    json: bool,
) -> Result<()> {
    let graph = PersonaGraphStore::from_aspects(&load_aspects(aspects_path)?)?;
    let mut budget = SelectionBudget::from(&config.persona);
    if let Some(tokens) = token_budget {
        budget.token_budget = tokens;
    }
    let selection = graph.retrieve_relevant(query, budget);

    if json {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }
    println!("── persona selection ────────────────────────────────");
    println!("  aspects : {} ({} edges)", graph.len(), graph.edges().len());
    println!(
        "  budget  : {} tokens, {} aspects",
        budget.token_budget, budget.limit
    );
    if selection.fallback {
        println!("  no aspect matched; using the smallest ones");
    }
    for node in &selection.nodes {
        println!(
            "  {:<16} ~{:>4} tok  {}",
            node.id,
            node.estimated_tokens,
            truncate_str(&node.title, 48)
        );
    }
    println!("  total   : ~{} tokens", selection.total_estimated_tokens);
    Ok(())
}

/// Inputs for one demo turn through the full pipeline.
pub(crate) struct TurnArgs {
    pub message: String,
    pub reply: String,
    pub persona_name: String,
    pub aspects: Option<PathBuf>,
    pub memories: Option<PathBuf>,
    pub memory_log: Option<PathBuf>,
    pub llm_failures: u32,
    pub prior_messages: u64,
    pub unavailable_ms: Option<u64>,
    pub json: bool,
}

/// Appends every extracted memory to `path` as one JSON line.
fn jsonl_persist(path: PathBuf) -> PersistFn {
    Arc::new(move |node: MemoryNode| {
        let path = path.clone();
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut line = serde_json::to_string(&node)?;
            line.push('\n');
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            file.write_all(line.as_bytes()).await?;
            Ok::<_, anyhow::Error>(())
        })
    })
}

fn log_emit() -> EmitFn {
    Arc::new(|events: Vec<GrowthEvent>| {
        Box::pin(async move {
            for event in &events {
                info!(?event, "growth event");
            }
            Ok::<_, anyhow::Error>(())
        })
    })
}

pub(crate) fn build_pipeline(config: &AppConfig, args: &TurnArgs) -> Result<Pipeline> {
    let graph = match &args.aspects {
        Some(path) => PersonaGraphStore::from_aspects(&load_aspects(path)?)?,
        None => PersonaGraphStore::default(),
    };
    let memories = match &args.memories {
        Some(path) => load_memories(path)?,
        None => Vec::new(),
    };
    let clock = system_clock();

    let upstream = UpstreamStages {
        context: Box::new(StaticContext {
            context: ConversationContext {
                history: Vec::new(),
                prior_message_count: args.prior_messages,
                availability: availability(args.unavailable_ms),
            },
        }),
        identity: Box::new(PersonaIdentity {
            persona_name: args.persona_name.clone(),
            graph,
            budget: SelectionBudget::from(&config.persona),
        }),
        emotional: Box::new(HeuristicEmotion {
            mood: MoodState::default(),
        }),
        prompt: Box::new(MemoryPrompt {
            memories,
            weights: RetrievalWeights::from(&config.memory),
            limit: config.memory.retrieval_limit,
            dimensions: config.memory.embedding_dimensions,
            clock: clock.clone(),
        }),
        llm: Box::new(ScriptedLlm::new(args.reply.clone(), args.llm_failures)),
    };

    let mut learner = LearnerStage::new(config.learner.clone(), config.memory.embedding_dimensions)
        .with_clock(clock)
        .with_ids(uuid_ids())
        .with_emit(log_emit());
    if let Some(path) = &args.memory_log {
        learner = learner.with_persist(jsonl_persist(path.clone()));
    }

    Ok(Pipeline::new(
        upstream,
        HumanizerStage::new(config.humanizer.clone())?,
        learner,
    ))
}

pub(crate) async fn run_turn(config: &AppConfig, args: TurnArgs) -> Result<LearnerPayload> {
    let pipeline = build_pipeline(config, &args)?;
    let input = TurnInput {
        user_id: "cli-user".to_string(),
        thread_id: "cli-thread".to_string(),
        message_id: uuid::Uuid::new_v4().to_string(),
        user_message: args.message.clone(),
    };
    let outcome = pipeline
        .run(input, RunOptions::from(&config.pipeline))
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(outcome);
    }

    println!("── turn ─────────────────────────────────────────────");
    println!("  persona  : {}", outcome.identity.persona_name);
    let aspect_ids: Vec<&str> = outcome.identity.aspects.iter().map(|a| a.id.as_str()).collect();
    println!("  aspects  : {}", aspect_ids.join(", "));
    println!(
        "  emotion  : complexity {:.2}, valence {:.2}, mood {}",
        outcome.emotional.complexity,
        outcome.emotional.valence,
        outcome.emotional.mood.label()
    );
    println!("  recalled : {}", outcome.prompt.memory_ids.join(", "));
    print_humanized(&outcome.humanized);

    let learned = &outcome.learner;
    println!("── learner ──────────────────────────────────────────");
    println!("  message #{}", learned.message_count);
    for memory in &learned.extracted_memories {
        println!(
            "  {:<10} {}",
            memory.kind.slug(),
            truncate_str(&memory.content, 72)
        );
    }
    if let Some(reflection) = &learned.reflection {
        println!("  reflection: {}", reflection.summary);
    }
    for failure in &learned.side_effect_failures {
        println!("  side effect failed: {} ({})", failure.collaborator, failure.message);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_memory::MemoryKind;

    fn args(dir: &Path) -> TurnArgs {
        TurnArgs {
            message: "My name is Ada and I prefer short walks by the river.".into(),
            reply: "That sounds lovely. Which part of the river do you like best? I could listen to you describe it for a while.".into(),
            persona_name: "Mara".into(),
            aspects: None,
            memories: None,
            memory_log: Some(dir.join("log").join("memories.jsonl")),
            llm_failures: 0,
            prior_messages: 0,
            unavailable_ms: None,
            json: true,
        }
    }

    #[tokio::test]
    async fn turn_persists_extracted_memories_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = run_turn(&AppConfig::default(), args(dir.path())).await.unwrap();

        let raw = fs::read_to_string(dir.path().join("log").join("memories.jsonl")).unwrap();
        let persisted: Vec<MemoryNode> = raw
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(persisted.len(), outcome.learner.extracted_memories.len());
        assert!(persisted.iter().any(|m| m.kind == MemoryKind::Episodic));
        assert!(persisted.iter().any(|m| m.content.contains("Ada")));
        assert!(outcome.learner.side_effect_failures.is_empty());
    }

    #[tokio::test]
    async fn llm_failures_within_retry_budget_recover() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.pipeline.max_retries = 2;
        let mut turn = args(dir.path());
        turn.llm_failures = 2;
        let outcome = run_turn(&config, turn).await.unwrap();
        assert!(outcome.humanized.messages.len() >= 2);
    }

    #[tokio::test]
    async fn llm_failures_beyond_retry_budget_fail_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut turn = args(dir.path());
        turn.llm_failures = 1;
        let err = run_turn(&AppConfig::default(), turn).await.unwrap_err();
        assert!(format!("{err:#}").contains("scripted-llm"));
    }

    #[test]
    fn persona_rejects_duplicate_aspects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aspects.json");
        let aspects = vec![
            PersonaAspect::new("a", "One", "first"),
            PersonaAspect::new("a", "Two", "second"),
        ];
        fs::write(&path, serde_json::to_string(&aspects).unwrap()).unwrap();
        assert!(run_persona(&AppConfig::default(), &path, "first", None, true).is_err());
    }
}
