use async_trait::async_trait;
use kindred_config::HumanizerConfig;
use kindred_humanizer::{HumanizeError, HumanizeRequest, Humanizer};

use crate::payload::{HumanizedPayload, LlmPayload};
use crate::stage::Stage;

/// Pipeline adapter around [`Humanizer`].
///
/// Emotional complexity is the upstream estimate raised by the current mood,
/// and availability comes from the gathered conversation context.
#[derive(Debug, Clone)]
pub struct HumanizerStage {
    humanizer: Humanizer,
}

impl HumanizerStage {
    pub fn new(config: HumanizerConfig) -> Result<Self, HumanizeError> {
        Ok(Self {
            humanizer: Humanizer::new(config)?,
        })
    }
}

#[async_trait]
impl Stage<LlmPayload, HumanizedPayload> for HumanizerStage {
    fn name(&self) -> &str {
        "humanizer"
    }

    async fn run(&self, input: LlmPayload) -> anyhow::Result<HumanizedPayload> {
        let request = HumanizeRequest {
            text: input.llm.text.clone(),
            emotional_complexity: input.emotional.effective_complexity(),
            availability: input.context.availability.clone(),
        };
        let humanized = self.humanizer.humanize(&request)?;
        Ok(input.with_humanized(humanized))
    }
}
