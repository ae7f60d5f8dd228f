//! Self-contained upstream stages for `kindred turn`.
//!
//! They stand in for the real context, identity, emotion, prompt and model
//! services so the whole pipeline can be driven from the command line.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use kindred_humanizer::{MoodState, MoodTrigger, transition};
use kindred_memory::sentiment::{emotional_intensity, infer_valence};
use kindred_memory::{MemoryNode, RetrievalWeights, embed, retrieve};
use kindred_persona::{PersonaGraphStore, SelectionBudget};
use kindred_runtime::{
    ClockFn, ContextPayload, ConversationContext, EmotionalContext, EmotionalPayload,
    IdentityContext, IdentityPayload, LlmCompletion, LlmPayload, PromptContext, PromptPayload,
    Stage, TurnInput,
};
use tracing::debug;

pub struct StaticContext {
    pub context: ConversationContext,
}

#[async_trait]
impl Stage<TurnInput, ContextPayload> for StaticContext {
    fn name(&self) -> &str {
        "static-context"
    }

    async fn run(&self, input: TurnInput) -> Result<ContextPayload> {
        Ok(input.with_context(self.context.clone()))
    }
}

pub struct PersonaIdentity {
    pub persona_name: String,
    pub graph: PersonaGraphStore,
    pub budget: SelectionBudget,
}

#[async_trait]
impl Stage<ContextPayload, IdentityPayload> for PersonaIdentity {
    fn name(&self) -> &str {
        "persona-identity"
    }

    async fn run(&self, input: ContextPayload) -> Result<IdentityPayload> {
        let selection = if self.graph.is_empty() {
            None
        } else {
            Some(self.graph.retrieve_relevant(&input.user_message, self.budget))
        };
        let identity = match selection {
            Some(selection) => IdentityContext {
                persona_name: self.persona_name.clone(),
                aspects: selection.nodes,
                total_estimated_tokens: selection.total_estimated_tokens,
            },
            None => IdentityContext {
                persona_name: self.persona_name.clone(),
                ..IdentityContext::default()
            },
        };
        Ok(input.with_identity(identity))
    }
}

/// Keyword heuristics for complexity and valence, with the mood advanced by
/// one trigger per turn.
pub struct HeuristicEmotion {
    pub mood: MoodState,
}

#[async_trait]
impl Stage<IdentityPayload, EmotionalPayload> for HeuristicEmotion {
    fn name(&self) -> &str {
        "heuristic-emotion"
    }

    async fn run(&self, input: IdentityPayload) -> Result<EmotionalPayload> {
        let valence = infer_valence(&input.user_message);
        let complexity = emotional_intensity(&input.user_message);
        let trigger = MoodTrigger::classify(&input.user_message, valence);
        let mood = transition(self.mood, trigger);
        debug!(?trigger, mood = mood.label(), complexity, valence, "demo emotion");
        Ok(input.with_emotional(EmotionalContext {
            complexity,
            valence,
            mood,
        }))
    }
}

/// Builds a plain-text prompt from persona aspects and retrieved memories.
pub struct MemoryPrompt {
    pub memories: Vec<MemoryNode>,
    pub weights: RetrievalWeights,
    pub limit: usize,
    pub dimensions: usize,
    pub clock: ClockFn,
}

#[async_trait]
impl Stage<EmotionalPayload, PromptPayload> for MemoryPrompt {
    fn name(&self) -> &str {
        "memory-prompt"
    }

    async fn run(&self, input: EmotionalPayload) -> Result<PromptPayload> {
        let query = embed(&input.user_message, self.dimensions);
        let now = (self.clock)();
        let recalled = retrieve(&self.memories, &query, &now, self.limit, Some(self.weights))?;

        let mut text = format!("You are {}.\n", input.identity.persona_name);
        for aspect in &input.identity.aspects {
            text.push_str(&format!("## {}\n{}\n", aspect.title, aspect.content));
        }
        if !recalled.selected.is_empty() {
            text.push_str("Relevant memories:\n");
            for scored in &recalled.selected {
                text.push_str(&format!("- ({:.2}) {}\n", scored.score, scored.memory.content));
            }
        }
        text.push_str(&format!(
            "Current mood: {}\nUser: {}\n",
            input.emotional.mood.label(),
            input.user_message
        ));

        let memory_ids = recalled
            .selected
            .iter()
            .map(|s| s.memory.id.clone())
            .collect();
        Ok(input.with_prompt(PromptContext { text, memory_ids }))
    }
}

/// Returns a fixed reply, failing its first `failures` calls so the retry
/// policy can be observed.
pub struct ScriptedLlm {
    pub reply: String,
    pub failures: u32,
    calls: AtomicU32,
}

impl ScriptedLlm {
    pub fn new(reply: impl Into<String>, failures: u32) -> Self {
        Self {
            reply: reply.into(),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage<PromptPayload, LlmPayload> for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted-llm"
    }

    async fn run(&self, input: PromptPayload) -> Result<LlmPayload> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            anyhow::bail!("scripted completion failure {call} of {}", self.failures);
        }
        Ok(input.with_llm(LlmCompletion {
            text: self.reply.clone(),
            model: "scripted".to_string(),
            response_id: format!("resp-{}", uuid::Uuid::new_v4()),
        }))
    }
}
