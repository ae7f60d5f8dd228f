//! Turns one model completion into a paced sequence of human-like message
//! deliveries.
//!
//! Every sub-model here is a pure function of its inputs: the same completion,
//! complexity and configuration always produce the same plan.

pub mod chunking;
pub mod error;
pub mod humanize;
pub mod mood;
pub mod presence;
pub mod revision;
pub mod timing;

pub use chunking::{Chunker, MAX_CHUNKS, MIN_CHUNKS, chunk_text};
pub use error::HumanizeError;
pub use humanize::{HumanizeRequest, HumanizedMessage, HumanizedOutput, Humanizer, humanize};
pub use mood::{MoodState, MoodTrigger, replay, transition};
pub use presence::{Availability, StrategicNonResponse, read_receipt_delay, strategic_non_response};
pub use revision::{RevisionEvent, evaluate_revision};
pub use timing::{TimingInput, TimingPlan, compute_timing_plan};
