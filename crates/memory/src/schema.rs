use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::timestamp::Timestamp;

/// Kinds of memory node.
///
/// | Kind         | Purpose                                                |
/// |--------------|--------------------------------------------------------|
/// | `Episodic`   | What happened in a single turn                         |
/// | `Semantic`   | Distilled facts about the user or the world            |
/// | `Reflective` | Periodic summaries the persona writes about the thread |
/// | `Procedural` | How the user likes things done                         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Reflective,
    Procedural,
}

impl MemoryKind {
    /// Lowercase slug used in logs and CLI output.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Reflective => "reflective",
            Self::Procedural => "procedural",
        }
    }

    /// Parse a kind from its slug (case-insensitive).
    pub fn from_slug(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Some(Self::Episodic),
            "semantic" => Some(Self::Semantic),
            "reflective" | "reflection" => Some(Self::Reflective),
            "procedural" => Some(Self::Procedural),
            _ => None,
        }
    }
}

/// Traceability back to the conversation message a memory was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceLink {
    pub message_id: String,
    pub thread_id: String,
    pub role: String,
    pub excerpt: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    /// Fixed length per deployment.  Empty or all-zero vectors are unusable
    /// for semantic scoring but the node is still ranked.
    #[serde(default)]
    pub embedding: Vec<f64>,
    #[serde(alias = "timestamp_iso")]
    pub timestamp: Timestamp,
    /// −1.0 (negative) ..= 1.0 (positive); magnitude is salience.
    #[serde(default)]
    pub emotional_valence: f64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceLink>,
}

fn default_decay_factor() -> f64 {
    1.0
}

impl MemoryNode {
    /// A node with neutral valence, no accesses and a full decay factor.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        kind: MemoryKind,
        content: impl Into<String>,
        timestamp: impl Into<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            kind,
            content: content.into(),
            embedding: Vec::new(),
            timestamp: timestamp.into(),
            emotional_valence: 0.0,
            access_count: 0,
            decay_factor: default_decay_factor(),
            metadata: BTreeMap::new(),
            provenance: Vec::new(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_valence(mut self, valence: f64) -> Self {
        self.emotional_valence = valence;
        self
    }

    pub fn created_at(&self) -> Result<DateTime<Utc>, MemoryError> {
        self.timestamp.to_datetime()
    }

    pub fn timestamp_iso(&self) -> Result<String, MemoryError> {
        self.timestamp.to_iso()
    }

    /// Valence with non-finite values normalised to zero.
    pub fn salience(&self) -> f64 {
        if self.emotional_valence.is_finite() {
            self.emotional_valence.abs().clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// First 8 characters of the id, used as a compact display identifier.
    pub fn id_short(&self) -> &str {
        match self.id.char_indices().nth(8) {
            Some((i, _)) => &self.id[..i],
            None => &self.id,
        }
    }
}

/// Truncate `s` to at most `max_chars` Unicode scalar values, returning a
/// sub-slice.
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_defaults_and_type_tag() {
        let raw = r#"{
            "id": "m-1",
            "user_id": "u-1",
            "type": "semantic",
            "content": "user likes green tea",
            "timestamp": 1700000000
        }"#;
        let node: MemoryNode = serde_json::from_str(raw).unwrap();
        assert_eq!(node.kind, MemoryKind::Semantic);
        assert!(node.embedding.is_empty());
        assert_eq!(node.access_count, 0);
        assert!((node.decay_factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(node.timestamp_iso().unwrap(), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn timestamp_iso_alias_is_accepted() {
        let raw = r#"{"id":"m","user_id":"u","type":"episodic","content":"x",
                      "timestamp_iso":"2024-01-01T00:00:00.000Z"}"#;
        let node: MemoryNode = serde_json::from_str(raw).unwrap();
        assert_eq!(node.timestamp_iso().unwrap(), "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn salience_normalises_non_finite_valence() {
        let node = MemoryNode::new("a", "u", MemoryKind::Episodic, "x", "2024-01-01")
            .with_valence(f64::NAN);
        assert_eq!(node.salience(), 0.0);
        let node = node.with_valence(-0.8);
        assert!((node.salience() - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn kind_slug_roundtrip() {
        for kind in [
            MemoryKind::Episodic,
            MemoryKind::Semantic,
            MemoryKind::Reflective,
            MemoryKind::Procedural,
        ] {
            assert_eq!(MemoryKind::from_slug(kind.slug()), Some(kind));
        }
        assert_eq!(MemoryKind::from_slug("nonsense"), None);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_str("héllo wörld", 4), "héll");
        assert_eq!(truncate_str("short", 10), "short");
    }
}
