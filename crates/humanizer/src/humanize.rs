use kindred_config::HumanizerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chunking::Chunker;
use crate::error::HumanizeError;
use crate::presence::{Availability, StrategicNonResponse, read_receipt_delay, strategic_non_response};
use crate::revision::{RevisionEvent, evaluate_revision};
use crate::timing::{TimingInput, compute_timing_plan};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanizeRequest {
    /// Raw model completion.
    pub text: String,
    /// Emotional complexity of the incoming user message, in `[0, 1]`.
    pub emotional_complexity: f64,
    #[serde(default)]
    pub availability: Availability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanizedMessage {
    pub text: String,
    pub delay_before_ms: u64,
    pub typing_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanizedOutput {
    pub messages: Vec<HumanizedMessage>,
    pub strategic_non_response: StrategicNonResponse,
    pub revision: RevisionEvent,
    pub read_delay_ms: u64,
}

impl HumanizedOutput {
    pub fn total_typing_ms(&self) -> u64 {
        self.messages.iter().map(|m| m.typing_duration_ms).sum()
    }
}

/// Reusable humanizer holding compiled chunking patterns.
#[derive(Debug, Clone)]
pub struct Humanizer {
    config: HumanizerConfig,
    chunker: Chunker,
}

impl Humanizer {
    pub fn new(config: HumanizerConfig) -> Result<Self, HumanizeError> {
        Ok(Self {
            config,
            chunker: Chunker::new()?,
        })
    }

    pub fn config(&self) -> &HumanizerConfig {
        &self.config
    }

    pub fn humanize(&self, request: &HumanizeRequest) -> Result<HumanizedOutput, HumanizeError> {
        if !request.emotional_complexity.is_finite() {
            return Err(HumanizeError::InvalidComplexity(request.emotional_complexity));
        }
        let complexity = request.emotional_complexity.clamp(0.0, 1.0);
        let chunks = self.chunker.split(&request.text)?;

        let read_delay_ms = read_receipt_delay(complexity, &self.config);
        let mut messages: Vec<HumanizedMessage> = chunks
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| {
                let plan = compute_timing_plan(
                    TimingInput {
                        text: &text,
                        chunk_index,
                        emotional_complexity: complexity,
                        read_delay_ms,
                    },
                    &self.config,
                );
                HumanizedMessage {
                    text,
                    delay_before_ms: plan.delay_before_ms,
                    typing_duration_ms: plan.typing_duration_ms,
                }
            })
            .collect();

        let revision = evaluate_revision(&request.text, complexity, request.text.contains('?'));
        if revision.should_revise {
            if let Some(last) = messages.last_mut() {
                last.delay_before_ms = last.delay_before_ms.saturating_add(revision.pause_ms);
            }
        }

        let strategic_non_response = strategic_non_response(&request.availability, &self.config);

        debug!(
            chunks = messages.len(),
            complexity,
            read_delay_ms,
            revised = revision.should_revise,
            delayed = strategic_non_response.should_delay,
            "completion humanized"
        );
        Ok(HumanizedOutput {
            messages,
            strategic_non_response,
            revision,
            read_delay_ms,
        })
    }
}

/// One-off humanization with a freshly built [`Humanizer`].
pub fn humanize(
    request: &HumanizeRequest,
    config: &HumanizerConfig,
) -> Result<HumanizedOutput, HumanizeError> {
    Humanizer::new(config.clone())?.humanize(request)
}
