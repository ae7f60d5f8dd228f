//! Persona mood as an explicit state machine.
//!
//! States are plain values and [`transition`] is a pure function, so any mood
//! can be reproduced by replaying its trigger history.

use serde::{Deserialize, Serialize};

/// Hurt escalates into conflict at this intensity.
const ESCALATION_POINT: u8 = 3;
const MAX_CONFLICT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MoodState {
    #[default]
    Calm,
    Playful,
    Hurt { intensity: u8 },
    Conflict { level: u8 },
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodTrigger {
    Kindness,
    Teasing,
    Slight,
    Apology,
    /// A neutral exchange; moods drift back toward calm.
    CoolDown,
}

impl MoodTrigger {
    /// Classify an incoming message from its text and inferred valence.
    pub fn classify(text: &str, valence: f64) -> Self {
        let lower = text.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        if has(&["sorry", "apologi", "my bad", "forgive me"]) {
            MoodTrigger::Apology
        } else if valence <= -0.3 {
            MoodTrigger::Slight
        } else if has(&["haha", "lol", "jk", "just kidding", "😜", "😏"]) {
            MoodTrigger::Teasing
        } else if valence >= 0.2 {
            MoodTrigger::Kindness
        } else {
            MoodTrigger::CoolDown
        }
    }
}

impl MoodState {
    /// Amount added to a turn's emotional complexity while in this mood.
    pub fn complexity_bias(&self) -> f64 {
        match *self {
            MoodState::Calm => 0.0,
            MoodState::Playful => 0.05,
            MoodState::Hurt { intensity } => (0.1 * f64::from(intensity)).min(0.3),
            MoodState::Conflict { level } => (0.3 + 0.1 * f64::from(level)).min(0.6),
            MoodState::Reconciling => 0.15,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MoodState::Calm => "calm",
            MoodState::Playful => "playful",
            MoodState::Hurt { .. } => "hurt",
            MoodState::Conflict { .. } => "conflict",
            MoodState::Reconciling => "reconciling",
        }
    }
}

fn hurt_more(intensity: u8) -> MoodState {
    let next = intensity.saturating_add(1);
    if next >= ESCALATION_POINT {
        MoodState::Conflict { level: 1 }
    } else {
        MoodState::Hurt { intensity: next }
    }
}

fn hurt_less(intensity: u8) -> MoodState {
    if intensity <= 1 {
        MoodState::Calm
    } else {
        MoodState::Hurt {
            intensity: intensity - 1,
        }
    }
}

pub fn transition(state: MoodState, trigger: MoodTrigger) -> MoodState {
    use MoodState::*;
    use MoodTrigger::*;

    match (state, trigger) {
        (Calm, Teasing) | (Playful, Teasing | Kindness | Apology) => Playful,
        (Calm, Kindness | Apology | CoolDown) => Calm,
        (Calm | Playful, Slight) => Hurt { intensity: 1 },
        (Playful, CoolDown) => Calm,

        (Hurt { intensity }, Slight | Teasing) => hurt_more(intensity),
        (Hurt { .. }, Apology) => Reconciling,
        (Hurt { intensity }, Kindness) if intensity <= 1 => Reconciling,
        (Hurt { intensity }, Kindness | CoolDown) => hurt_less(intensity),

        (Conflict { level }, Slight | Teasing) => Conflict {
            level: level.saturating_add(1).min(MAX_CONFLICT),
        },
        (Conflict { level }, Apology) if level <= 1 => Reconciling,
        (Conflict { level }, Apology | CoolDown) if level > 1 => Conflict { level: level - 1 },
        (Conflict { .. }, CoolDown) => Hurt {
            intensity: ESCALATION_POINT - 1,
        },
        (Conflict { level }, Kindness | Apology) => Conflict { level },

        (Reconciling, Kindness | Apology | CoolDown) => Calm,
        (Reconciling, Teasing) => Playful,
        (Reconciling, Slight) => Hurt {
            intensity: ESCALATION_POINT - 1,
        },
    }
}

/// Fold a trigger history into the resulting mood.
pub fn replay<I>(initial: MoodState, triggers: I) -> MoodState
where
    I: IntoIterator<Item = MoodTrigger>,
{
    triggers.into_iter().fold(initial, transition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_slights_escalate_to_conflict() {
        let mood = replay(
            MoodState::Calm,
            [MoodTrigger::Slight, MoodTrigger::Slight, MoodTrigger::Slight],
        );
        assert_eq!(mood, MoodState::Conflict { level: 1 });
    }

    #[test]
    fn conflict_is_capped() {
        let mood = replay(MoodState::Conflict { level: 1 }, [MoodTrigger::Slight; 10]);
        assert_eq!(mood, MoodState::Conflict { level: MAX_CONFLICT });
    }

    #[test]
    fn apology_resolves_through_reconciling() {
        let mood = replay(
            MoodState::Conflict { level: 2 },
            [MoodTrigger::Apology, MoodTrigger::Apology, MoodTrigger::Kindness],
        );
        assert_eq!(mood, MoodState::Calm);
        assert_eq!(
            transition(MoodState::Conflict { level: 1 }, MoodTrigger::Apology),
            MoodState::Reconciling
        );
    }

    #[test]
    fn kindness_alone_does_not_end_a_conflict() {
        let state = MoodState::Conflict { level: 2 };
        assert_eq!(transition(state, MoodTrigger::Kindness), state);
    }

    #[test]
    fn cooling_down_drifts_to_calm() {
        let mood = replay(MoodState::Conflict { level: 3 }, [MoodTrigger::CoolDown; 8]);
        assert_eq!(mood, MoodState::Calm);
    }

    #[test]
    fn transition_is_pure() {
        let state = MoodState::Hurt { intensity: 1 };
        assert_eq!(
            transition(state, MoodTrigger::Teasing),
            transition(state, MoodTrigger::Teasing)
        );
        assert_eq!(state, MoodState::Hurt { intensity: 1 });
    }

    #[test]
    fn bias_grows_with_tension() {
        assert_eq!(MoodState::Calm.complexity_bias(), 0.0);
        assert!(
            MoodState::Conflict { level: 1 }.complexity_bias()
                > MoodState::Hurt { intensity: 1 }.complexity_bias()
        );
        assert!(MoodState::Conflict { level: 3 }.complexity_bias() <= 0.6);
    }

    #[test]
    fn classify_reads_apologies_and_warmth() {
        assert_eq!(MoodTrigger::classify("I'm so sorry about earlier", -0.2), MoodTrigger::Apology);
        assert_eq!(MoodTrigger::classify("you are wonderful", 0.4), MoodTrigger::Kindness);
        assert_eq!(MoodTrigger::classify("that was awful of you", -0.5), MoodTrigger::Slight);
        assert_eq!(MoodTrigger::classify("haha nice try", 0.0), MoodTrigger::Teasing);
        assert_eq!(MoodTrigger::classify("what time is it", 0.0), MoodTrigger::CoolDown);
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&MoodState::Hurt { intensity: 2 }).unwrap();
        assert_eq!(json, r#"{"state":"hurt","intensity":2}"#);
    }
}
