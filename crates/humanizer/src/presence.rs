//! Read receipts and strategic non-response.

use kindred_config::HumanizerConfig;
use serde::{Deserialize, Serialize};

use crate::timing::normalize_complexity;

/// Availability signal reported by upstream context gathering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    #[serde(default)]
    pub suggested_delay_ms: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Default for Availability {
    fn default() -> Self {
        Self {
            available: true,
            suggested_delay_ms: 0,
            reason: None,
        }
    }
}

impl Availability {
    pub fn unavailable(suggested_delay_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            available: false,
            suggested_delay_ms,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategicNonResponse {
    pub should_delay: bool,
    pub delay_ms: u64,
    pub reason: String,
}

/// Delay before the incoming message shows as read.  Rises linearly from
/// `base_read_delay_ms` to `max_read_delay_ms` with the message's emotional
/// complexity.
pub fn read_receipt_delay(emotional_complexity: f64, config: &HumanizerConfig) -> u64 {
    let complexity = normalize_complexity(emotional_complexity);
    let base = config.base_read_delay_ms as f64;
    let span = config.max_read_delay_ms.saturating_sub(config.base_read_delay_ms) as f64;
    (base + span * complexity).round() as u64
}

/// When the persona is unavailable, hold the reply for at least the suggested
/// delay (and never less than `min_non_response_ms`).
pub fn strategic_non_response(
    availability: &Availability,
    config: &HumanizerConfig,
) -> StrategicNonResponse {
    if availability.available {
        return StrategicNonResponse {
            should_delay: false,
            delay_ms: 0,
            reason: "available".to_string(),
        };
    }
    StrategicNonResponse {
        should_delay: true,
        delay_ms: availability.suggested_delay_ms.max(config.min_non_response_ms),
        reason: availability
            .reason
            .clone()
            .unwrap_or_else(|| "unavailable".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_delay_rises_with_complexity() {
        let config = HumanizerConfig::default();
        let mut last = 0;
        for step in 0..=10 {
            let delay = read_receipt_delay(step as f64 / 10.0, &config);
            assert!(delay >= last);
            last = delay;
        }
        assert_eq!(read_receipt_delay(0.0, &config), 600);
        assert_eq!(read_receipt_delay(1.0, &config), 3_600);
    }

    #[test]
    fn unavailable_persona_delays_at_least_the_suggestion() {
        let config = HumanizerConfig::default();
        for suggested in [0, 999, 1_000, 45_000] {
            let snr = strategic_non_response(&Availability::unavailable(suggested, "asleep"), &config);
            assert!(snr.should_delay);
            assert!(snr.delay_ms >= suggested);
            assert!(snr.delay_ms >= config.min_non_response_ms);
            assert_eq!(snr.reason, "asleep");
        }
    }

    #[test]
    fn available_persona_does_not_delay() {
        let snr = strategic_non_response(&Availability::default(), &HumanizerConfig::default());
        assert!(!snr.should_delay);
        assert_eq!(snr.delay_ms, 0);
    }

    #[test]
    fn availability_defaults_when_fields_are_missing() {
        let parsed: Availability = serde_json::from_str(r#"{"available":false}"#).unwrap();
        assert_eq!(parsed.suggested_delay_ms, 0);
        assert_eq!(parsed.reason, None);
    }
}
