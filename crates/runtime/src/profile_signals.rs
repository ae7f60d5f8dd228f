//! Per-turn profile fact extraction.
//!
//! Cheap phrase matching over the user's message ("I prefer …", "my name is …")
//! so stable facts become semantic memories on the turn they are mentioned.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Longest value kept, in characters.
const MAX_VALUE_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSignal {
    pub key: String,
    pub value: String,
    pub category: String,
}

#[derive(Clone, Copy)]
enum Capture {
    Phrase,
    Word,
}

/// `(prefixes, key, category, capture)`; first match per key wins.
const PATTERNS: &[(&[&str], &str, &str, Capture)] = &[
    (&["i prefer ", "i like "], "preference", "preference", Capture::Phrase),
    (&["my name is "], "name", "fact", Capture::Word),
    (&["i'm working on ", "i am working on "], "current_project", "fact", Capture::Phrase),
    (&["i use ", "i'm using ", "i am using "], "tooling", "preference", Capture::Phrase),
    (&["my goal is ", "i want to "], "goal", "goal", Capture::Phrase),
];

pub fn extract_profile_signals(user_message: &str) -> Vec<ProfileSignal> {
    let mut signals = Vec::new();
    let mut seen_keys = HashSet::new();

    for (prefixes, key, category, capture) in PATTERNS {
        for prefix in *prefixes {
            if seen_keys.contains(key) {
                break;
            }
            let Some(rest) = after_prefix(user_message, prefix) else {
                continue;
            };
            let value = match capture {
                Capture::Phrase => phrase(rest),
                Capture::Word => word(rest),
            };
            if value.is_empty() || value.chars().count() > MAX_VALUE_CHARS {
                continue;
            }
            seen_keys.insert(key);
            signals.push(ProfileSignal {
                key: key.to_string(),
                value,
                category: category.to_string(),
            });
        }
    }
    signals
}

/// Text following the first word-boundary, ASCII-case-insensitive occurrence
/// of `prefix`.
fn after_prefix<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut previous: Option<char> = None;
    for (i, ch) in text.char_indices() {
        let at_boundary = previous.is_none_or(|p| !p.is_alphanumeric() && p != '\'');
        if at_boundary {
            if let Some(candidate) = text.get(i..i + prefix.len()) {
                if candidate.eq_ignore_ascii_case(prefix) {
                    return text.get(i + prefix.len()..);
                }
            }
        }
        previous = Some(ch);
    }
    None
}

/// Everything up to the first sentence break.
fn phrase(text: &str) -> String {
    let end = text.find(['.', '!', '?', '\n', ';']).unwrap_or(text.len());
    text[..end].trim().to_string()
}

fn word(text: &str) -> String {
    text.split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .unwrap_or_default()
}
