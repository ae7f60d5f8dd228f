use thiserror::Error;

/// Malformed input rejected by the retrieval and consolidation engines.
///
/// These fail fast instead of silently producing zero scores.  Non-finite
/// valences are the one exception: they are normalised to `0.0`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoryError {
    #[error("retrieval weight `{name}` must be finite and non-negative, got {value}")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("retrieval weights must sum to 1.0, got {sum}")]
    WeightsDoNotSumToOne { sum: f64 },

    #[error("memory {id} has a {found}-dimensional embedding, expected {expected}")]
    EmbeddingDimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid timestamp `{value}`: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("consolidation option `{name}` is out of range: {value}")]
    InvalidOption { name: &'static str, value: f64 },
}
