pub mod collaborators;
mod error;
pub mod humanizer_stage;
pub mod learner;
pub mod payload;
pub mod pipeline;
pub mod profile_signals;
pub mod stage;

pub use collaborators::{
    ClockFn, CollaboratorFailure, EmitFn, GrowthEvent, IdFn, PersistFn, fixed_clock,
    sequential_ids, system_clock, uuid_ids,
};
pub use error::PipelineError;
pub use humanizer_stage::HumanizerStage;
pub use learner::{LearnerOutput, LearnerStage, Reflection};
pub use payload::{
    ContextPayload, ConversationContext, EmotionalContext, EmotionalPayload, HistoryMessage,
    HumanizedPayload, IdentityContext, IdentityPayload, LearnerPayload, LlmCompletion, LlmPayload,
    PromptContext, PromptPayload, TurnInput,
};
pub use pipeline::{Pipeline, RunOptions, UpstreamStages};
pub use stage::{PipelineStage, Stage};
