use kindred_config::HumanizerConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Pause before the first chunk on top of the read delay, at zero complexity.
const BASE_THINK_MS: f64 = 250.0;
/// Extra thinking time at full emotional complexity.
const COMPLEXITY_THINK_MS: f64 = 750.0;
/// Each later chunk waits a little longer than the one before it.
const GAP_STEP_MS: u64 = 120;
const COMPLEXITY_GAP_MS: f64 = 400.0;
/// Upper bound (exclusive) of the text-seeded jitter added between chunks.
const JITTER_SPAN_MS: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingInput<'a> {
    pub text: &'a str,
    pub chunk_index: usize,
    /// Expected in `[0, 1]`; out-of-range values are clamped and non-finite
    /// values treated as 0.
    pub emotional_complexity: f64,
    pub read_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub delay_before_ms: u64,
    pub typing_duration_ms: u64,
}

pub(crate) fn normalize_complexity(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Delay and typing duration for one chunk.  Both are always at least 1 ms.
///
/// Typing grows with chunk length and with emotional complexity and is capped
/// at `max_typing_ms`.  The first chunk waits out the read delay plus a
/// thinking pause; later chunks wait `min_gap_ms` plus an index-based step and
/// a jitter seeded from the chunk text, so the plan is reproducible.
pub fn compute_timing_plan(input: TimingInput<'_>, config: &HumanizerConfig) -> TimingPlan {
    let complexity = normalize_complexity(input.emotional_complexity);
    let chars = input.text.chars().count() as f64;

    let slowdown = 1.0 + config.complexity_typing_factor.max(0.0) * complexity;
    let typing = config.base_typing_ms as f64 + chars * config.ms_per_char as f64 * slowdown;
    let typing_duration_ms = (typing.round() as u64).min(config.max_typing_ms).max(1);

    let delay_before_ms = if input.chunk_index == 0 {
        let think = BASE_THINK_MS + COMPLEXITY_THINK_MS * complexity;
        input.read_delay_ms.saturating_add(think.round() as u64)
    } else {
        config
            .min_gap_ms
            .saturating_add(GAP_STEP_MS * input.chunk_index as u64)
            .saturating_add((COMPLEXITY_GAP_MS * complexity).round() as u64)
            .saturating_add(jitter(input.text, input.chunk_index))
    }
    .max(1);

    TimingPlan {
        delay_before_ms,
        typing_duration_ms,
    }
}

fn jitter(text: &str, chunk_index: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update((chunk_index as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head) % JITTER_SPAN_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(text: &str, chunk_index: usize, complexity: f64) -> TimingPlan {
        compute_timing_plan(
            TimingInput {
                text,
                chunk_index,
                emotional_complexity: complexity,
                read_delay_ms: 600,
            },
            &HumanizerConfig::default(),
        )
    }

    #[test]
    fn durations_are_strictly_positive() {
        let zeroed = HumanizerConfig {
            base_typing_ms: 0,
            ms_per_char: 0,
            min_gap_ms: 0,
            ..HumanizerConfig::default()
        };
        for index in 0..4 {
            let p = compute_timing_plan(
                TimingInput {
                    text: "",
                    chunk_index: index,
                    emotional_complexity: 0.0,
                    read_delay_ms: 0,
                },
                &zeroed,
            );
            assert!(p.delay_before_ms > 0);
            assert!(p.typing_duration_ms > 0);
        }
    }

    #[test]
    fn typing_grows_with_length_and_complexity() {
        let short = plan("see you soon", 1, 0.2);
        let long = plan("see you soon, and bring the photos from the lake house", 1, 0.2);
        assert!(long.typing_duration_ms >= short.typing_duration_ms);

        let calm = plan("I know this week has been hard on you.", 1, 0.0);
        let heavy = plan("I know this week has been hard on you.", 1, 0.9);
        assert!(heavy.typing_duration_ms >= calm.typing_duration_ms);
    }

    #[test]
    fn typing_is_capped() {
        let wall = "x".repeat(10_000);
        assert_eq!(plan(&wall, 0, 1.0).typing_duration_ms, 14_000);
    }

    #[test]
    fn first_chunk_waits_for_read_delay() {
        let p = plan("hey!", 0, 0.0);
        assert_eq!(p.delay_before_ms, 600 + 250);
    }

    #[test]
    fn later_chunks_respect_min_gap() {
        for index in 1..4 {
            let p = plan("and another thing", index, 0.0);
            assert!(p.delay_before_ms >= 700 + GAP_STEP_MS * index as u64);
            assert!(p.delay_before_ms < 700 + GAP_STEP_MS * index as u64 + JITTER_SPAN_MS);
        }
    }

    #[test]
    fn plans_are_reproducible() {
        assert_eq!(plan("same text", 2, 0.4), plan("same text", 2, 0.4));
    }

    #[test]
    fn non_finite_complexity_is_treated_as_calm() {
        assert_eq!(plan("hello there", 1, f64::NAN), plan("hello there", 1, 0.0));
        assert_eq!(plan("hello there", 1, 7.0), plan("hello there", 1, 1.0));
    }
}
