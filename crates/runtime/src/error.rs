use thiserror::Error;

use crate::stage::PipelineStage;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Any failure inside a stage's `run`, after retries where they apply.
    #[error("pipeline stage `{stage}` ({position}) failed after {attempts} attempt(s): {source:#}")]
    StageFailed {
        /// Name reported by the stage itself.
        stage: String,
        position: PipelineStage,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> &str {
        match self {
            PipelineError::StageFailed { stage, .. } => stage,
        }
    }

    pub fn position(&self) -> PipelineStage {
        match self {
            PipelineError::StageFailed { position, .. } => *position,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PipelineError::StageFailed { attempts, .. } => *attempts,
        }
    }
}
