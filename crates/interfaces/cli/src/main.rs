mod demo_stages;
mod memory_cmds;
mod pipeline_cmds;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kindred_config::AppConfig;
use kindred_memory::recall::RecallScenario;

use crate::pipeline_cmds::TurnArgs;

#[derive(Debug, Parser)]
#[command(
    name = "kindred",
    version,
    about = "Memory, persona and humanized delivery for a conversational companion"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,
    /// Print machine-readable JSON instead of the text report.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Split a reply into timed chunks.
    Humanize {
        text: String,
        /// Emotional complexity in [0, 1].
        #[arg(long, default_value_t = 0.3)]
        complexity: f64,
        /// Treat the persona as unavailable for this many milliseconds.
        #[arg(long)]
        unavailable_ms: Option<u64>,
    },
    /// Rank stored memories against a query.
    Retrieve {
        /// JSON array of memory nodes.
        #[arg(long)]
        memories: PathBuf,
        query: String,
        /// Reference time (ISO-8601); defaults to now.
        #[arg(long)]
        now: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Plan (or apply) merge, strengthen and decay over a memory set.
    Consolidate {
        #[arg(long)]
        memories: PathBuf,
        #[arg(long)]
        now: Option<String>,
        /// Apply the plan instead of reporting it.
        #[arg(long)]
        commit: bool,
        /// Where to write the consolidated set when committing.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Select persona aspects relevant to a message.
    Persona {
        /// JSON array of persona aspects.
        #[arg(long)]
        aspects: PathBuf,
        query: String,
        #[arg(long)]
        token_budget: Option<usize>,
    },
    /// Synthetic long-conversation recall check.
    RecallBench {
        #[arg(long, default_value_t = 20)]
        facts: usize,
        #[arg(long, default_value_t = 100)]
        turns: usize,
        #[arg(long, default_value_t = 3)]
        limit: usize,
        /// Minimum acceptable recall rate.
        #[arg(long, default_value_t = 0.65)]
        target: f64,
    },
    /// Drive one message through the full seven-stage pipeline.
    Turn {
        message: String,
        /// Text the scripted model replies with.
        #[arg(
            long,
            default_value = "I hear you. Tell me a little more about how that went? I'm listening, take your time."
        )]
        reply: String,
        #[arg(long, default_value = "Kindred")]
        persona_name: String,
        #[arg(long)]
        aspects: Option<PathBuf>,
        #[arg(long)]
        memories: Option<PathBuf>,
        /// Append extracted memories to this JSONL file.
        #[arg(long)]
        memory_log: Option<PathBuf>,
        /// Number of times the scripted model fails before answering.
        #[arg(long, default_value_t = 0)]
        llm_failures: u32,
        #[arg(long, default_value_t = 0)]
        prior_messages: u64,
        #[arg(long)]
        unavailable_ms: Option<u64>,
    },
    /// Print the effective configuration.
    Config,
}

fn now_or_system(now: Option<String>) -> String {
    now.unwrap_or_else(|| kindred_memory::timestamp::format_iso(chrono::Utc::now()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Humanize {
            text,
            complexity,
            unavailable_ms,
        } => pipeline_cmds::run_humanize(&config, &text, complexity, unavailable_ms, cli.json)?,
        Commands::Retrieve {
            memories,
            query,
            now,
            limit,
        } => memory_cmds::run_retrieve(
            &config,
            &memories,
            &query,
            &now_or_system(now),
            limit,
            cli.json,
        )?,
        Commands::Consolidate {
            memories,
            now,
            commit,
            out,
        } => memory_cmds::run_consolidate(
            &config,
            &memories,
            &now_or_system(now),
            commit,
            out.as_deref(),
            cli.json,
        )?,
        Commands::Persona {
            aspects,
            query,
            token_budget,
        } => pipeline_cmds::run_persona(&config, &aspects, &query, token_budget, cli.json)?,
        Commands::RecallBench {
            facts,
            turns,
            limit,
            target,
        } => {
            let scenario = RecallScenario {
                fact_count: facts,
                turns,
                limit,
                dimensions: config.memory.embedding_dimensions,
            };
            memory_cmds::run_recall_bench(scenario, target, cli.json)?;
        }
        Commands::Turn {
            message,
            reply,
            persona_name,
            aspects,
            memories,
            memory_log,
            llm_failures,
            prior_messages,
            unavailable_ms,
        } => {
            pipeline_cmds::run_turn(
                &config,
                TurnArgs {
                    message,
                    reply,
                    persona_name,
                    aspects,
                    memories,
                    memory_log,
                    llm_failures,
                    prior_messages,
                    unavailable_ms,
                    json: cli.json,
                },
            )
            .await?;
        }
        Commands::Config => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("── config ({}) ──", cli.config.display());
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}
