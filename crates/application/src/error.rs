//! Application-level error model.

use thiserror::Error;

use chronicle_core::{AggregateId, SnapshotError, Version, VersionError};
use chronicle_persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Replay yielded no state for the requested id/version.
    #[error("aggregate not found: {id}")]
    AggregateNotFound {
        id: AggregateId,
        version: Option<Version>,
    },

    /// A replayed event did not follow the aggregate's version. Never
    /// retried; indicates a bug or a stale replay.
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Misconfiguration: snapshot requested without a snapshot store,
    /// unresolvable persistence module, malformed section id, and the like.
    /// Never retried.
    #[error("programming error: {0}")]
    Programming(String),
}

impl ApplicationError {
    pub fn programming(msg: impl Into<String>) -> Self {
        Self::Programming(msg.into())
    }

    /// True when the underlying failure is an optimistic-concurrency or
    /// tracking collision, the retriable outcome.
    pub fn is_integrity_conflict(&self) -> bool {
        matches!(self, Self::Persistence(p) if p.is_integrity())
    }
}
