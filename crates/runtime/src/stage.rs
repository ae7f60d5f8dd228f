use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One step of the turn pipeline.
///
/// A stage receives the cumulative payload produced by its predecessor and
/// returns that payload extended by exactly one named field.
#[async_trait]
pub trait Stage<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn name(&self) -> &str;

    async fn run(&self, input: I) -> anyhow::Result<O>;
}

/// The seven fixed pipeline positions, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Context,
    Identity,
    Emotional,
    Prompt,
    Llm,
    Humanizer,
    Learner,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Context,
        PipelineStage::Identity,
        PipelineStage::Emotional,
        PipelineStage::Prompt,
        PipelineStage::Llm,
        PipelineStage::Humanizer,
        PipelineStage::Learner,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Context => "context",
            PipelineStage::Identity => "identity",
            PipelineStage::Emotional => "emotional",
            PipelineStage::Prompt => "prompt",
            PipelineStage::Llm => "llm",
            PipelineStage::Humanizer => "humanizer",
            PipelineStage::Learner => "learner",
        }
    }

    pub fn next(self) -> Option<PipelineStage> {
        let index = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(index + 1).copied()
    }

    /// Only the completion-generation stage is retried.
    pub fn is_retryable(self) -> bool {
        self == PipelineStage::Llm
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
