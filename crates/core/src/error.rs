//! Domain error model.
//!
//! Keep this focused on deterministic domain failures. Infrastructure
//! concerns (storage, transport) have their own error types elsewhere.

use thiserror::Error;

use crate::event::Version;
use crate::id::AggregateId;

/// An identifier failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct IdError(pub String);

/// An event's originator version does not follow the aggregate's current
/// version.
///
/// This indicates a bug or a stale replay, never a transient condition; it
/// must not be retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("version mismatch for {originator_id}: expected {expected}, found {found}")]
pub struct VersionError {
    pub originator_id: AggregateId,
    pub expected: Version,
    pub found: Version,
}

/// Taking or restoring a snapshot failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The aggregate state could not be serialized.
    #[error("failed to serialize aggregate state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The recorded state could not be restored into an aggregate.
    #[error("failed to restore aggregate state: {0}")]
    Restore(#[source] serde_json::Error),
}
