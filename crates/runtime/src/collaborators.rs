//! Injected side-effect collaborators for the learner stage.
//!
//! Clocks and id generators are plain closures so tests can pin them; the
//! persistence and telemetry hooks are async and may fail without aborting
//! the turn.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures::future::BoxFuture;
use kindred_memory::MemoryKind;
use kindred_memory::MemoryNode;
use kindred_memory::timestamp::format_iso;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returns "now" as an ISO-8601 string with millisecond precision.
pub type ClockFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Returns a fresh id on every call.
pub type IdFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Durable storage for one extracted memory.
pub type PersistFn = Arc<dyn Fn(MemoryNode) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Side-channel notification of growth events.
pub type EmitFn =
    Arc<dyn Fn(Vec<GrowthEvent>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub fn system_clock() -> ClockFn {
    Arc::new(|| format_iso(Utc::now()))
}

pub fn fixed_clock(now_iso: impl Into<String>) -> ClockFn {
    let now_iso = now_iso.into();
    Arc::new(move || now_iso.clone())
}

pub fn uuid_ids() -> IdFn {
    Arc::new(|| Uuid::new_v4().to_string())
}

/// `{prefix}-1`, `{prefix}-2`, … shared across clones of the returned fn.
pub fn sequential_ids(prefix: impl Into<String>) -> IdFn {
    let prefix = prefix.into();
    let counter = Arc::new(AtomicU64::new(0));
    Arc::new(move || {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{prefix}-{n}")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GrowthEvent {
    MemoryExtracted {
        memory_id: String,
        kind: MemoryKind,
    },
    ReflectionCreated {
        reflection_id: String,
        observation_count: usize,
    },
}

/// A non-fatal failure from an injected collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorFailure {
    /// `embed_text`, `persist_memory` or `emit_growth_events`.
    pub collaborator: String,
    /// Memory id the call concerned, when there is one.
    pub target_id: Option<String>,
    pub message: String,
}

impl CollaboratorFailure {
    pub fn new(
        collaborator: &str,
        target_id: Option<&str>,
        error: &anyhow::Error,
    ) -> Self {
        Self {
            collaborator: collaborator.to_string(),
            target_id: target_id.map(str::to_string),
            message: format!("{error:#}"),
        }
    }
}
