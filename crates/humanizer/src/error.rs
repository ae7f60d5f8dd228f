use thiserror::Error;

#[derive(Debug, Error)]
pub enum HumanizeError {
    #[error("completion text is empty")]
    EmptyCompletion,

    #[error("completion text has {chars} character(s); at least 2 are needed to form two messages")]
    CompletionTooShort { chars: usize },

    #[error("emotional complexity must be finite, got {0}")]
    InvalidComplexity(f64),

    #[error("invalid chunking pattern: {0}")]
    Pattern(#[from] regex::Error),
}
