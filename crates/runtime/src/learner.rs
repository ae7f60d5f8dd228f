//! Post-turn learning: turn the finished exchange into memory nodes and,
//! every N messages, a reflection.

use std::collections::HashMap;

use async_trait::async_trait;
use kindred_config::LearnerConfig;
use kindred_memory::schema::truncate_str;
use kindred_memory::sentiment::infer_valence;
use kindred_memory::{EmbedFn, MemoryKind, MemoryNode, ProvenanceLink, embed};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::collaborators::{
    ClockFn, CollaboratorFailure, EmitFn, GrowthEvent, IdFn, PersistFn, system_clock, uuid_ids,
};
use crate::payload::{HumanizedPayload, LearnerPayload};
use crate::profile_signals::extract_profile_signals;
use crate::stage::Stage;

/// Terms shorter than this are ignored when summarising themes.
const MIN_THEME_CHARS: usize = 4;
const THEMES_PER_REFLECTION: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: String,
    pub summary: String,
    /// History messages the reflection was drawn from.
    pub observation_count: usize,
    pub themes: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerOutput {
    pub extracted_memories: Vec<MemoryNode>,
    pub reflection: Option<Reflection>,
    /// Running count of user messages including this turn.
    pub message_count: u64,
    pub growth_events: Vec<GrowthEvent>,
    /// Collaborator errors that did not stop the turn.
    #[serde(default)]
    pub side_effect_failures: Vec<CollaboratorFailure>,
}

pub struct LearnerStage {
    config: LearnerConfig,
    dimensions: usize,
    embed_text: Option<EmbedFn>,
    clock: ClockFn,
    ids: IdFn,
    persist: Option<PersistFn>,
    emit: Option<EmitFn>,
}

impl LearnerStage {
    /// A learner using the deterministic embedder, the system clock and
    /// random ids, with no persistence or telemetry hooks.
    pub fn new(config: LearnerConfig, dimensions: usize) -> Self {
        Self {
            config,
            dimensions,
            embed_text: None,
            clock: system_clock(),
            ids: uuid_ids(),
            persist: None,
            emit: None,
        }
    }

    pub fn with_embedder(mut self, embed_text: EmbedFn) -> Self {
        self.embed_text = Some(embed_text);
        self
    }

    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: IdFn) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_persist(mut self, persist: PersistFn) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn with_emit(mut self, emit: EmitFn) -> Self {
        self.emit = Some(emit);
        self
    }

    /// Embed with the injected provider, or the deterministic embedder when
    /// none is set.
    ///
    /// A failed provider call yields an empty embedding. The node is still
    /// stored and ranked, but stays out of semantic scoring instead of mixing
    /// a vector of another width into the provider's store.
    async fn embed(&self, text: &str, failures: &mut Vec<CollaboratorFailure>) -> Vec<f64> {
        let Some(embed_text) = &self.embed_text else {
            return embed(text, self.dimensions);
        };
        match embed_text(text.to_string()).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!(error = %err, "learner: embedding provider failed, storing without embedding");
                failures.push(CollaboratorFailure::new("embed_text", None, &err));
                Vec::new()
            }
        }
    }

    fn should_reflect(&self, message_count: u64, history_len: usize) -> bool {
        let every = self.config.reflection_every_n_messages;
        every > 0
            && message_count % every == 0
            && history_len >= self.config.reflection_min_messages
    }

    pub async fn learn(&self, input: &HumanizedPayload) -> LearnerOutput {
        let now = (self.clock)();
        let message_count = input.context.prior_message_count + 1;
        let excerpt_chars = self.config.excerpt_chars;
        let mut failures = Vec::new();
        let mut memories = Vec::new();

        let user_link = ProvenanceLink {
            message_id: input.message_id.clone(),
            thread_id: input.thread_id.clone(),
            role: "user".to_string(),
            excerpt: truncate_str(&input.user_message, excerpt_chars).to_string(),
            created_at: now.clone(),
        };
        let reply = input.reply_text();
        let reply_link = ProvenanceLink {
            message_id: input.llm.response_id.clone(),
            thread_id: input.thread_id.clone(),
            role: "assistant".to_string(),
            excerpt: truncate_str(&reply, excerpt_chars).to_string(),
            created_at: now.clone(),
        };

        // ── Turn summary ─────────────────────────────────────────────────────
        let summary = format!(
            "User said: \"{}\" | Replied: \"{}\"",
            truncate_str(input.user_message.trim(), excerpt_chars),
            truncate_str(reply.trim(), excerpt_chars),
        );
        let mut episode = MemoryNode::new(
            (self.ids)(),
            input.user_id.clone(),
            MemoryKind::Episodic,
            summary.clone(),
            now.clone(),
        )
        .with_embedding(self.embed(&summary, &mut failures).await)
        .with_valence(infer_valence(&input.user_message));
        episode.metadata.insert("thread_id".into(), json!(input.thread_id));
        episode.metadata.insert("mood".into(), json!(input.emotional.mood.label()));
        episode.metadata.insert("source".into(), json!("learner"));
        episode.provenance = vec![user_link.clone(), reply_link];
        memories.push(episode);

        // ── Profile facts ────────────────────────────────────────────────────
        for signal in extract_profile_signals(&input.user_message) {
            let content = format!("{}: {}", signal.key, signal.value);
            let mut fact = MemoryNode::new(
                (self.ids)(),
                input.user_id.clone(),
                MemoryKind::Semantic,
                content.clone(),
                now.clone(),
            )
            .with_embedding(self.embed(&content, &mut failures).await);
            fact.metadata.insert("profile_key".into(), json!(signal.key));
            fact.metadata.insert("profile_category".into(), json!(signal.category));
            fact.metadata.insert("source".into(), json!("learner"));
            fact.provenance = vec![user_link.clone()];
            memories.push(fact);
        }

        // ── Reflection ───────────────────────────────────────────────────────
        let history_len = input.context.history.len();
        let reflection = if self.should_reflect(message_count, history_len) {
            let themes = recurring_themes(
                input
                    .context
                    .history
                    .iter()
                    .map(|m| m.content.as_str())
                    .chain(std::iter::once(input.user_message.as_str())),
            );
            let summary = if themes.is_empty() {
                format!("After {message_count} messages the conversation has no recurring themes yet.")
            } else {
                format!(
                    "After {message_count} messages the conversation keeps returning to: {}.",
                    themes.join(", ")
                )
            };
            let reflection = Reflection {
                id: (self.ids)(),
                summary: summary.clone(),
                observation_count: history_len,
                themes,
                created_at: now.clone(),
            };
            let mut node = MemoryNode::new(
                reflection.id.clone(),
                input.user_id.clone(),
                MemoryKind::Reflective,
                summary.clone(),
                now.clone(),
            )
            .with_embedding(self.embed(&summary, &mut failures).await);
            node.metadata
                .insert("observation_count".into(), json!(reflection.observation_count));
            node.metadata.insert("source".into(), json!("learner"));
            node.provenance = input
                .context
                .history
                .iter()
                .map(|m| ProvenanceLink {
                    message_id: m.message_id.clone(),
                    thread_id: input.thread_id.clone(),
                    role: m.role.clone(),
                    excerpt: truncate_str(&m.content, excerpt_chars).to_string(),
                    created_at: now.clone(),
                })
                .collect();
            memories.push(node);
            info!(
                reflection_id = %reflection.id,
                observation_count = reflection.observation_count,
                message_count,
                "learner: reflection created"
            );
            Some(reflection)
        } else {
            None
        };

        // ── Side effects ─────────────────────────────────────────────────────
        if let Some(persist) = &self.persist {
            for memory in &memories {
                if let Err(err) = persist(memory.clone()).await {
                    warn!(error = %err, memory_id = %memory.id, "learner: failed to persist memory");
                    failures.push(CollaboratorFailure::new("persist_memory", Some(&memory.id), &err));
                }
            }
        }

        let mut growth_events: Vec<GrowthEvent> = memories
            .iter()
            .map(|m| GrowthEvent::MemoryExtracted {
                memory_id: m.id.clone(),
                kind: m.kind,
            })
            .collect();
        if let Some(reflection) = &reflection {
            growth_events.push(GrowthEvent::ReflectionCreated {
                reflection_id: reflection.id.clone(),
                observation_count: reflection.observation_count,
            });
        }
        if let Some(emit) = &self.emit {
            if let Err(err) = emit(growth_events.clone()).await {
                warn!(error = %err, events = growth_events.len(), "learner: failed to emit growth events");
                failures.push(CollaboratorFailure::new("emit_growth_events", None, &err));
            }
        }

        debug!(
            extracted = memories.len(),
            message_count,
            reflected = reflection.is_some(),
            failures = failures.len(),
            "learner: turn processed"
        );

        LearnerOutput {
            extracted_memories: memories,
            reflection,
            message_count,
            growth_events,
            side_effect_failures: failures,
        }
    }
}

#[async_trait]
impl Stage<HumanizedPayload, LearnerPayload> for LearnerStage {
    fn name(&self) -> &str {
        "learner"
    }

    async fn run(&self, input: HumanizedPayload) -> anyhow::Result<LearnerPayload> {
        let output = self.learn(&input).await;
        Ok(input.with_learner(output))
    }
}

/// Most frequent content terms across `texts`, ties broken alphabetically.
fn recurring_themes<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for term in kindred_persona::terms(text) {
            if term.chars().count() >= MIN_THEME_CHARS {
                *counts.entry(term).or_default() += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().filter(|(_, n)| *n > 1).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(THEMES_PER_REFLECTION)
        .map(|(term, _)| term)
        .collect()
}
