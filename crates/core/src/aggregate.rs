//! Aggregate contract: a cluster of state changed only by appending events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::VersionError;
use crate::event::{DomainEvent, Version};
use crate::id::AggregateId;

/// An event-sourced aggregate root.
///
/// Aggregates are reconstructible values: given the same event sequence,
/// replay yields an equal aggregate. Command handling happens outside this
/// trait; implementations record the events a command produces in a pending
/// buffer and hand them over through [`collect_events`](Self::collect_events).
///
/// The `Serialize`/`DeserializeOwned` bounds exist so recorded state can be
/// captured in snapshots. Transient buffers (the pending-event list) should
/// be excluded from serialization with `#[serde(skip)]`.
pub trait Aggregate:
    Sized + Clone + core::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The event family this aggregate emits and replays.
    type Event: DomainEvent;

    /// Stable name of the aggregate type, recorded on snapshots.
    const TOPIC: &'static str;

    fn id(&self) -> AggregateId;

    /// Number of events applied so far. 0 only for never-created state.
    fn version(&self) -> Version;

    fn created_on(&self) -> DateTime<Utc>;

    fn modified_on(&self) -> DateTime<Utc>;

    /// Construct initial state from a creation event.
    ///
    /// Returns `None` when the event is not a creation event for this type.
    fn from_event(event: &Self::Event) -> Option<Self>;

    /// Fold one subsequent event into the current state.
    ///
    /// Implementations must verify `event.originator_version() ==
    /// self.version() + 1` and fail with [`VersionError`] otherwise, then
    /// advance `version` and `modified_on`.
    fn apply(&mut self, event: &Self::Event) -> Result<(), VersionError>;

    /// Drain pending events in trigger order.
    ///
    /// After a successful save the buffer is empty; saving again without new
    /// commands stores nothing.
    fn collect_events(&mut self) -> Vec<Self::Event>;

    /// Check an incoming event against the current version.
    ///
    /// Helper for `apply` implementations.
    fn check_version(&self, event: &Self::Event) -> Result<(), VersionError> {
        let expected = self.version() + 1;
        let found = event.originator_version();
        if found != expected {
            return Err(VersionError {
                originator_id: event.originator_id(),
                expected,
                found,
            });
        }
        Ok(())
    }
}
