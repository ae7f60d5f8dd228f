use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Retry policy for the completion-generation stage.  Every other stage is
/// fail-fast regardless of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extra attempts allowed after the first failure of the completion stage.
    pub max_retries: u32,
    /// Fixed wait between completion attempts.  Not jittered, not exponential.
    pub retry_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
        }
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Vector length produced by the deterministic fallback embedder.
    pub embedding_dimensions: usize,
    /// Default number of memories returned by a retrieval call.
    pub retrieval_limit: usize,
    /// Retrieval signal weights.  The four values must sum to 1.0.
    pub semantic_weight: f64,
    pub recency_weight: f64,
    pub emotional_weight: f64,
    pub frequency_weight: f64,
    /// Cosine similarity at or above which two memories fold into one.
    pub merge_similarity_threshold: f64,
    /// Memories older than this (and neither merged nor strengthened) decay.
    pub decay_after_days: f64,
    /// `|valence|` at or above which a memory is reinforced during consolidation.
    pub emotional_strengthen_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: 256,
            retrieval_limit: 5,
            semantic_weight: 0.4,
            recency_weight: 0.3,
            emotional_weight: 0.2,
            frequency_weight: 0.1,
            merge_similarity_threshold: 0.92,
            decay_after_days: 30.0,
            emotional_strengthen_threshold: 0.7,
        }
    }
}

// ── Persona ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Maximum combined estimated tokens of aspects injected per turn.
    pub token_budget: usize,
    /// Maximum number of aspects injected per turn.
    pub limit: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            token_budget: 200,
            limit: 3,
        }
    }
}

// ── Humanizer ─────────────────────────────────────────────────────────────────

/// Timing constants for the message humanizer.  All durations are in
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanizerConfig {
    /// Fixed cost of starting to type any chunk.
    pub base_typing_ms: u64,
    /// Typing cost per character of chunk text.
    pub ms_per_char: u64,
    /// Upper bound on a single chunk's typing duration.
    pub max_typing_ms: u64,
    /// Typing slowdown at full emotional complexity (0.6 → up to 60% slower).
    pub complexity_typing_factor: f64,
    /// Minimum gap between consecutive chunks.
    pub min_gap_ms: u64,
    /// Read-receipt delay for an emotionally flat incoming message.
    pub base_read_delay_ms: u64,
    /// Read-receipt delay at full emotional complexity.
    pub max_read_delay_ms: u64,
    /// Floor applied to strategic non-response delays.
    pub min_non_response_ms: u64,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            base_typing_ms: 450,
            ms_per_char: 38,
            max_typing_ms: 14_000,
            complexity_typing_factor: 0.6,
            min_gap_ms: 700,
            base_read_delay_ms: 600,
            max_read_delay_ms: 3_600,
            min_non_response_ms: 1_000,
        }
    }
}

// ── Learner ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// A reflection is produced on every Nth message.  `0` disables reflection.
    pub reflection_every_n_messages: u64,
    /// Minimum conversation history required before a reflection is produced.
    pub reflection_min_messages: usize,
    /// Maximum characters kept in provenance excerpts and turn summaries.
    pub excerpt_chars: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            reflection_every_n_messages: 10,
            reflection_min_messages: 6,
            excerpt_chars: 160,
        }
    }
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub memory: MemoryConfig,
    pub persona: PersonaConfig,
    pub humanizer: HumanizerConfig,
    pub learner: LearnerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        config.apply_env_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Apply `KINDRED_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("KINDRED_LOG_LEVEL") {
            if !level.is_empty() {
                self.telemetry.log_level = level;
            }
        }

        // Unparsable values are ignored rather than failing startup.
        if let Some(raw) = lookup("KINDRED_MAX_RETRIES") {
            if let Ok(retries) = raw.trim().parse::<u32>() {
                self.pipeline.max_retries = retries;
            }
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
