//! Materialized aggregate state at a version, used to skip replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::error::SnapshotError;
use crate::event::{DomainEvent, Version};
use crate::id::AggregateId;

/// A snapshot of an aggregate's recorded state at a given version.
///
/// Snapshots live in a separate logical sequence from regular events but
/// share the `originator_version` coordinate system: a snapshot at version V
/// stands in for events 1..=V, and replay from it must yield the same
/// aggregate as replay from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    originator_id: AggregateId,
    originator_version: Version,
    timestamp: DateTime<Utc>,
    topic: String,
    state: serde_json::Value,
}

impl Snapshot {
    /// Capture the current state of an aggregate.
    pub fn take<A: Aggregate>(aggregate: &A) -> Result<Self, SnapshotError> {
        let state = serde_json::to_value(aggregate).map_err(SnapshotError::Serialize)?;
        Ok(Self {
            originator_id: aggregate.id(),
            originator_version: aggregate.version(),
            timestamp: Utc::now(),
            topic: A::TOPIC.to_string(),
            state,
        })
    }

    /// Reconstruct the aggregate captured by this snapshot.
    pub fn restore<A: Aggregate>(&self) -> Result<A, SnapshotError> {
        serde_json::from_value(self.state.clone()).map_err(SnapshotError::Restore)
    }

    pub fn state(&self) -> &serde_json::Value {
        &self.state
    }
}

impl DomainEvent for Snapshot {
    fn originator_id(&self) -> AggregateId {
        self.originator_id
    }

    fn originator_version(&self) -> Version {
        self.originator_version
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}
