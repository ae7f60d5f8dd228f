use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A named slice of persona definition, as supplied by the persona importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaAspect {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Explicit token cost.  Estimated from the text when absent.
    #[serde(default)]
    pub estimated_tokens: Option<usize>,
}

impl PersonaAspect {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            keywords: Vec::new(),
            estimated_tokens: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

/// Rough token estimate: one token per four characters, at least one.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Filler words excluded from the term set so they cannot link unrelated
/// aspects.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "was", "has", "are", "not", "this", "that", "with", "from", "have",
    "you", "can", "its", "will", "but", "they", "all", "been", "also", "into", "more", "than",
    "when", "who", "what", "how", "out", "our", "new", "now", "her", "his", "she", "him",
    "your", "their", "about", "very", "just",
];

/// Lower-cased alphanumeric terms of at least three characters, minus stop
/// words.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn terms_drop_short_and_stop_words() {
        let t = terms("She and I went to the Observatory, it was NICE");
        assert!(t.contains("observatory"));
        assert!(t.contains("went"));
        assert!(t.contains("nice"));
        assert!(!t.contains("she"));
        assert!(!t.contains("and"));
        assert!(!t.contains("to"));
    }
}
