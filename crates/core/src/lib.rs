//! Core domain model: identifiers, events, aggregates, snapshots.
//!
//! This crate defines the vocabulary shared by every other chronicle crate.
//! It makes no storage assumptions: events are plain serializable records,
//! aggregates are reconstructible values, and replay is a deterministic fold.

pub mod aggregate;
pub mod error;
pub mod event;
pub mod id;
pub mod projector;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

pub use aggregate::Aggregate;
pub use error::{SnapshotError, VersionError};
pub use event::{DomainEvent, Version};
pub use id::AggregateId;
pub use projector::Projector;
pub use snapshot::Snapshot;
