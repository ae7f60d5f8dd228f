//! Turn pipeline orchestrator.
//!
//! Runs the five injected upstream stages, then the humanizer and learner,
//! strictly in order.  Only the completion (`llm`) stage is retried; any other
//! failure stops the turn immediately.  Every failure reaches the caller as a
//! single [`PipelineError::StageFailed`].

use std::time::Duration;

use kindred_config::PipelineConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::humanizer_stage::HumanizerStage;
use crate::learner::LearnerStage;
use crate::payload::{
    ContextPayload, EmotionalPayload, IdentityPayload, LearnerPayload, LlmPayload, PromptPayload,
    TurnInput,
};
use crate::stage::{PipelineStage, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Extra attempts allowed for the completion stage.
    pub max_retries: u32,
    /// Fixed wait between completion attempts.
    pub retry_delay_ms: u64,
}

impl From<&PipelineConfig> for RunOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }
}

/// The externally supplied stages 1–5.
pub struct UpstreamStages {
    pub context: Box<dyn Stage<TurnInput, ContextPayload>>,
    pub identity: Box<dyn Stage<ContextPayload, IdentityPayload>>,
    pub emotional: Box<dyn Stage<IdentityPayload, EmotionalPayload>>,
    pub prompt: Box<dyn Stage<EmotionalPayload, PromptPayload>>,
    pub llm: Box<dyn Stage<PromptPayload, LlmPayload>>,
}

pub struct Pipeline {
    upstream: UpstreamStages,
    humanizer: HumanizerStage,
    learner: LearnerStage,
}

impl Pipeline {
    pub fn new(upstream: UpstreamStages, humanizer: HumanizerStage, learner: LearnerStage) -> Self {
        Self {
            upstream,
            humanizer,
            learner,
        }
    }

    #[instrument(
        skip(self, input),
        fields(user = %input.user_id, thread = %input.thread_id, message = %input.message_id)
    )]
    pub async fn run(
        &self,
        input: TurnInput,
        options: RunOptions,
    ) -> Result<LearnerPayload, PipelineError> {
        let context = run_once(self.upstream.context.as_ref(), PipelineStage::Context, input).await?;
        let identity =
            run_once(self.upstream.identity.as_ref(), PipelineStage::Identity, context).await?;
        let emotional =
            run_once(self.upstream.emotional.as_ref(), PipelineStage::Emotional, identity).await?;
        let prompt = run_once(self.upstream.prompt.as_ref(), PipelineStage::Prompt, emotional).await?;
        let llm = run_with_retry(self.upstream.llm.as_ref(), PipelineStage::Llm, prompt, options)
            .await?;
        let humanized = run_once(&self.humanizer, PipelineStage::Humanizer, llm).await?;
        let learned = run_once(&self.learner, PipelineStage::Learner, humanized).await?;

        info!(
            messages = learned.humanized.messages.len(),
            memories = learned.learner.extracted_memories.len(),
            side_effect_failures = learned.learner.side_effect_failures.len(),
            "pipeline: turn complete"
        );
        Ok(learned)
    }
}

async fn run_once<I, O, S>(stage: &S, position: PipelineStage, input: I) -> Result<O, PipelineError>
where
    I: Send + 'static,
    O: Send + 'static,
    S: Stage<I, O> + ?Sized,
{
    debug!(stage = stage.name(), %position, "pipeline: stage started");
    match stage.run(input).await {
        Ok(output) => Ok(output),
        Err(source) => {
            warn!(stage = stage.name(), %position, error = %format!("{source:#}"), "pipeline: stage failed");
            Err(PipelineError::StageFailed {
                stage: stage.name().to_string(),
                position,
                attempts: 1,
                source,
            })
        }
    }
}

/// Run `stage` up to `max_retries + 1` times with the same input, waiting
/// `retry_delay_ms` between attempts.
async fn run_with_retry<I, O, S>(
    stage: &S,
    position: PipelineStage,
    input: I,
    options: RunOptions,
) -> Result<O, PipelineError>
where
    I: Clone + Send + 'static,
    O: Send + 'static,
    S: Stage<I, O> + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(stage = stage.name(), %position, attempt, "pipeline: stage started");
        match stage.run(input.clone()).await {
            Ok(output) => return Ok(output),
            Err(source) if attempt <= options.max_retries => {
                warn!(
                    stage = stage.name(),
                    attempt,
                    max_retries = options.max_retries,
                    error = %format!("{source:#}"),
                    "pipeline: stage failed, retrying"
                );
                if options.retry_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(options.retry_delay_ms)).await;
                }
            }
            Err(source) => {
                warn!(stage = stage.name(), %position, attempts = attempt, error = %format!("{source:#}"), "pipeline: stage failed, retries exhausted");
                return Err(PipelineError::StageFailed {
                    stage: stage.name().to_string(),
                    position,
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use async_trait::async_trait;
    use kindred_config::{HumanizerConfig, LearnerConfig};

    use super::*;
    use crate::collaborators::{fixed_clock, sequential_ids};
    use crate::payload::{
        ConversationContext, EmotionalContext, IdentityContext, LlmCompletion, PromptContext,
    };

    struct MapStage<F> {
        name: &'static str,
        calls: Arc<AtomicU32>,
        f: F,
    }

    #[async_trait]
    impl<I, O, F> Stage<I, O> for MapStage<F>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> anyhow::Result<O> + Send + Sync,
    {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, input: I) -> anyhow::Result<O> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.f)(input)
        }
    }

    fn map_stage<I, O, F>(name: &'static str, calls: &Arc<AtomicU32>, f: F) -> Box<dyn Stage<I, O>>
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Box::new(MapStage {
            name,
            calls: calls.clone(),
            f,
        })
    }

    /// Fails its first `failures` calls.
    struct FlakyLlm {
        failures: u32,
        calls: Arc<AtomicU32>,
        reply: &'static str,
    }

    #[async_trait]
    impl Stage<PromptPayload, LlmPayload> for FlakyLlm {
        fn name(&self) -> &str {
            "flaky-llm"
        }

        async fn run(&self, input: PromptPayload) -> anyhow::Result<LlmPayload> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                anyhow::bail!("upstream timeout on call {call}");
            }
            Ok(input.with_llm(LlmCompletion {
                text: self.reply.to_string(),
                model: "stub-model".into(),
                response_id: format!("resp-{call}"),
            }))
        }
    }

    struct Counters {
        upstream: Arc<AtomicU32>,
        llm: Arc<AtomicU32>,
    }

    fn pipeline_with(
        llm_failures: u32,
        reply: &'static str,
        fail_identity: bool,
    ) -> (Pipeline, Counters) {
        let counters = Counters {
            upstream: Arc::new(AtomicU32::new(0)),
            llm: Arc::new(AtomicU32::new(0)),
        };
        let upstream = UpstreamStages {
            context: map_stage("context", &counters.upstream, |input: TurnInput| {
                Ok(input.with_context(ConversationContext {
                    prior_message_count: 2,
                    ..ConversationContext::default()
                }))
            }),
            identity: map_stage(
                if fail_identity { "failing-identity" } else { "identity" },
                &counters.upstream,
                move |input: ContextPayload| {
                    if fail_identity {
                        anyhow::bail!("persona document missing");
                    }
                    Ok(input.with_identity(IdentityContext {
                        persona_name: "Mara".into(),
                        ..IdentityContext::default()
                    }))
                },
            ),
            emotional: map_stage("emotional", &counters.upstream, |input: IdentityPayload| {
                Ok(input.with_emotional(EmotionalContext {
                    complexity: 0.4,
                    ..EmotionalContext::default()
                }))
            }),
            prompt: map_stage("prompt", &counters.upstream, |input: EmotionalPayload| {
                let text = format!("Reply warmly to: {}", input.user_message);
                Ok(input.with_prompt(PromptContext {
                    text,
                    memory_ids: vec![],
                }))
            }),
            llm: Box::new(FlakyLlm {
                failures: llm_failures,
                calls: counters.llm.clone(),
                reply,
            }),
        };
        let learner = LearnerStage::new(LearnerConfig::default(), 32)
            .with_clock(fixed_clock("2025-03-01T12:00:00.000Z"))
            .with_ids(sequential_ids("mem"));
        let humanizer = HumanizerStage::new(HumanizerConfig::default()).unwrap();
        (Pipeline::new(upstream, humanizer, learner), counters)
    }

    fn turn() -> TurnInput {
        TurnInput {
            user_id: "user-1".into(),
            thread_id: "thread-1".into(),
            message_id: "msg-1".into(),
            user_message: "I finally finished the quilt!".into(),
        }
    }

    const REPLY: &str = "That is huge, congratulations! How does it feel to see it finished?";

    #[tokio::test]
    async fn completion_failing_once_is_retried_exactly_twice() {
        let (pipeline, counters) = pipeline_with(1, REPLY, false);
        let out = pipeline
            .run(
                turn(),
                RunOptions {
                    max_retries: 1,
                    retry_delay_ms: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(counters.llm.load(Ordering::SeqCst), 2);
        assert_eq!(out.llm.response_id, "resp-2");
    }

    #[tokio::test]
    async fn exhausted_retries_surface_wrapped_error() {
        let (pipeline, counters) = pipeline_with(5, REPLY, false);
        let err = pipeline
            .run(
                turn(),
                RunOptions {
                    max_retries: 2,
                    retry_delay_ms: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(counters.llm.load(Ordering::SeqCst), 3);
        assert_eq!(err.stage(), "flaky-llm");
        assert_eq!(err.position(), PipelineStage::Llm);
        assert_eq!(err.attempts(), 3);
        let source = std::error::Error::source(&err).unwrap().to_string();
        assert!(source.contains("upstream timeout on call 3"), "{source}");
    }

    #[tokio::test]
    async fn default_options_do_not_retry() {
        let (pipeline, counters) = pipeline_with(1, REPLY, false);
        let err = pipeline.run(turn(), RunOptions::default()).await.unwrap_err();
        assert_eq!(counters.llm.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test]
    async fn other_stages_fail_fast_without_retry() {
        let (pipeline, counters) = pipeline_with(0, REPLY, true);
        let err = pipeline
            .run(
                turn(),
                RunOptions {
                    max_retries: 3,
                    retry_delay_ms: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "failing-identity");
        assert_eq!(err.position(), PipelineStage::Identity);
        assert_eq!(err.attempts(), 1);
        assert!(err.to_string().contains("persona document missing"));
        // Context and identity each ran once; nothing after identity ran.
        assert_eq!(counters.upstream.load(Ordering::SeqCst), 2);
        assert_eq!(counters.llm.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn humanizer_failure_is_wrapped() {
        let (pipeline, _) = pipeline_with(0, "   ", false);
        let err = pipeline.run(turn(), RunOptions::default()).await.unwrap_err();
        assert_eq!(err.stage(), "humanizer");
        assert_eq!(err.position(), PipelineStage::Humanizer);
    }

    #[tokio::test]
    async fn single_character_reply_fails_at_the_humanizer() {
        let (pipeline, counters) = pipeline_with(0, "👍", false);
        let err = pipeline
            .run(
                turn(),
                RunOptions {
                    max_retries: 2,
                    retry_delay_ms: 0,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "humanizer");
        assert_eq!(err.position(), PipelineStage::Humanizer);
        assert_eq!(err.attempts(), 1);
        assert!(err.to_string().contains("1 character(s)"), "{err}");
        // The completion itself succeeded and is not re-requested.
        assert_eq!(counters.llm.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_run_accumulates_every_field() {
        let (pipeline, _) = pipeline_with(0, REPLY, false);
        let out = pipeline.run(turn(), RunOptions::default()).await.unwrap();
        assert_eq!(out.user_message, "I finally finished the quilt!");
        assert_eq!(out.context.prior_message_count, 2);
        assert_eq!(out.identity.persona_name, "Mara");
        assert_eq!(out.emotional.complexity, 0.4);
        assert!(out.prompt.text.contains("quilt"));
        assert_eq!(out.llm.text, REPLY);
        assert!((2..=4).contains(&out.humanized.messages.len()));
        assert_eq!(out.learner.message_count, 3);
        assert!(!out.learner.extracted_memories.is_empty());
        assert_eq!(out.learner.extracted_memories[0].provenance[0].message_id, "msg-1");
    }

    #[tokio::test]
    async fn retry_waits_between_attempts() {
        let (pipeline, _) = pipeline_with(2, REPLY, false);
        let started = Instant::now();
        pipeline
            .run(
                turn(),
                RunOptions {
                    max_retries: 2,
                    retry_delay_ms: 15,
                },
            )
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn options_follow_config() {
        let options = RunOptions::from(&PipelineConfig {
            max_retries: 4,
            retry_delay_ms: 250,
        });
        assert_eq!(
            options,
            RunOptions {
                max_retries: 4,
                retry_delay_ms: 250
            }
        );
    }
}
