pub mod consolidation;
pub mod embedding;
pub mod error;
pub mod recall;
pub mod retrieval;
pub mod schema;
pub mod sentiment;
pub mod timestamp;

pub use consolidation::{
    ConsolidationOptions, ConsolidationOutcome, ConsolidationReport, ConsolidationSummary,
    MergePlan, consolidate,
};
pub use embedding::{
    DEFAULT_DIMENSIONS, EmbedFn, compute_semantic_score, cosine_similarity, deterministic_embed_fn,
    embed, is_usable,
};
pub use error::MemoryError;
pub use retrieval::{RetrievalResult, RetrievalWeights, ScoredMemory, SignalBreakdown, retrieve};
pub use schema::{MemoryKind, MemoryNode, ProvenanceLink};
pub use timestamp::Timestamp;
