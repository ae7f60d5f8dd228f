//! Cumulative stage payloads.
//!
//! Each payload is its predecessor plus one named field.  The only way to
//! build the next payload is the predecessor's `with_*` method, which moves
//! every prior field across unchanged.

use kindred_humanizer::{Availability, HumanizedOutput, MoodState};
use kindred_persona::PersonaGraphNode;
use serde::{Deserialize, Serialize};

use crate::learner::LearnerOutput;

// ── Stage inputs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub message_id: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub history: Vec<HistoryMessage>,
    /// Messages the user has sent in this relationship before this turn.
    pub prior_message_count: u64,
    #[serde(default)]
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IdentityContext {
    pub persona_name: String,
    pub aspects: Vec<PersonaGraphNode>,
    pub total_estimated_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionalContext {
    /// Emotional complexity of the incoming message, `[0, 1]`.
    pub complexity: f64,
    pub valence: f64,
    #[serde(default)]
    pub mood: MoodState,
}

impl EmotionalContext {
    /// Complexity with the current mood's bias applied, clamped to `[0, 1]`.
    pub fn effective_complexity(&self) -> f64 {
        let raw = if self.complexity.is_finite() {
            self.complexity
        } else {
            0.0
        };
        (raw + self.mood.complexity_bias()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PromptContext {
    pub text: String,
    /// Ids of memories that were placed into the prompt.
    #[serde(default)]
    pub memory_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LlmCompletion {
    pub text: String,
    pub model: String,
    pub response_id: String,
}

// ── Accumulated payloads ──────────────────────────────────────────────────────

impl TurnInput {
    pub fn with_context(self, context: ConversationContext) -> ContextPayload {
        ContextPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
}

impl ContextPayload {
    pub fn with_identity(self, identity: IdentityContext) -> IdentityPayload {
        IdentityPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
}

impl IdentityPayload {
    pub fn with_emotional(self, emotional: EmotionalContext) -> EmotionalPayload {
        EmotionalPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity: self.identity,
            emotional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
    pub emotional: EmotionalContext,
}

impl EmotionalPayload {
    pub fn with_prompt(self, prompt: PromptContext) -> PromptPayload {
        PromptPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity: self.identity,
            emotional: self.emotional,
            prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
    pub emotional: EmotionalContext,
    pub prompt: PromptContext,
}

impl PromptPayload {
    pub fn with_llm(self, llm: LlmCompletion) -> LlmPayload {
        LlmPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity: self.identity,
            emotional: self.emotional,
            prompt: self.prompt,
            llm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
    pub emotional: EmotionalContext,
    pub prompt: PromptContext,
    pub llm: LlmCompletion,
}

impl LlmPayload {
    pub fn with_humanized(self, humanized: HumanizedOutput) -> HumanizedPayload {
        HumanizedPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity: self.identity,
            emotional: self.emotional,
            prompt: self.prompt,
            llm: self.llm,
            humanized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanizedPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
    pub emotional: EmotionalContext,
    pub prompt: PromptContext,
    pub llm: LlmCompletion,
    pub humanized: HumanizedOutput,
}

impl HumanizedPayload {
    pub fn with_learner(self, learner: LearnerOutput) -> LearnerPayload {
        LearnerPayload {
            user_id: self.user_id,
            thread_id: self.thread_id,
            message_id: self.message_id,
            user_message: self.user_message,
            context: self.context,
            identity: self.identity,
            emotional: self.emotional,
            prompt: self.prompt,
            llm: self.llm,
            humanized: self.humanized,
            learner,
        }
    }

    /// The delivered reply as one string, chunks joined by a space.
    pub fn reply_text(&self) -> String {
        self.humanized
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Final pipeline output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerPayload {
    pub user_id: String,
    pub thread_id: String,
    pub message_id: String,
    pub user_message: String,
    pub context: ConversationContext,
    pub identity: IdentityContext,
    pub emotional: EmotionalContext,
    pub prompt: PromptContext,
    pub llm: LlmCompletion,
    pub humanized: HumanizedOutput,
    pub learner: LearnerOutput,
}
