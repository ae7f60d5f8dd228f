//! "Pauses to reconsider": a persona occasionally stops before its last
//! message as if rewording it.

use serde::{Deserialize, Serialize};

use crate::timing::normalize_complexity;

/// Score at or above which the persona revises.
const REVISION_THRESHOLD: f64 = 0.5;
const BASE_PAUSE_MS: f64 = 800.0;
const SCORE_PAUSE_MS: f64 = 1_200.0;
/// Completions this long count as fully "long" for the length signal.
const LONG_TEXT_CHARS: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevisionEvent {
    pub should_revise: bool,
    /// Extra wait before the final message; 0 unless `should_revise`.
    pub pause_ms: u64,
    pub score: f64,
}

/// `score = 0.6·complexity + 0.2·question + 0.2·min(1, chars/400)`.
pub fn evaluate_revision(text: &str, emotional_complexity: f64, poses_question: bool) -> RevisionEvent {
    let complexity = normalize_complexity(emotional_complexity);
    let length = (text.chars().count() as f64 / LONG_TEXT_CHARS).min(1.0);
    let question = if poses_question { 1.0 } else { 0.0 };
    let score = 0.6 * complexity + 0.2 * question + 0.2 * length;

    let should_revise = score >= REVISION_THRESHOLD;
    let pause_ms = if should_revise {
        (BASE_PAUSE_MS + SCORE_PAUSE_MS * score).round() as u64
    } else {
        0
    };
    RevisionEvent {
        should_revise,
        pause_ms,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calm_short_statement_is_not_revised() {
        let event = evaluate_revision("Sure, 7pm works.", 0.1, false);
        assert!(!event.should_revise);
        assert_eq!(event.pause_ms, 0);
    }

    #[test]
    fn charged_question_is_revised_with_positive_pause() {
        let event = evaluate_revision("Do you really think they meant it that way?", 0.7, true);
        assert!(event.should_revise);
        assert!(event.pause_ms > 0);
        assert_eq!(event.pause_ms, (800.0 + 1200.0 * event.score).round() as u64);
    }

    #[test]
    fn question_tips_a_borderline_case() {
        let text = "I hear you.";
        assert!(!evaluate_revision(text, 0.5, false).should_revise);
        assert!(evaluate_revision(text, 0.5, true).should_revise);
    }
}
