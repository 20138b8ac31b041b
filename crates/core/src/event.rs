//! The domain event contract.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::id::AggregateId;

/// Position of an event in its aggregate's sequence.
///
/// The creation event carries version 1; each subsequent event for the same
/// aggregate increments by exactly 1.
pub type Version = u64;

/// A domain event: an immutable, ordered fact about an aggregate.
///
/// Events are the source of truth. They are appended once, never mutated or
/// deleted, and state is rebuilt by replaying them in `originator_version`
/// order.
///
/// Implementations are typically an enum with one struct per variant; the
/// topic names the variant and must stay stable across releases, since it is
/// what readers of the store use to interpret recorded state.
///
/// Events must own all their data (`'static`), serialize cleanly, and cross
/// thread boundaries, so they can be stored, transported, and replayed in
/// concurrent hosts.
pub trait DomainEvent:
    Clone + core::fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The aggregate this event belongs to.
    fn originator_id(&self) -> AggregateId;

    /// Position in the aggregate's sequence, starting at 1 for creation.
    fn originator_version(&self) -> Version;

    /// Wall-clock time at creation. Informational; never used for ordering.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Stable name of the event type (e.g. "bank.account.opened").
    ///
    /// Namespaced with dots by convention. Changing a topic breaks
    /// deserialization of historical events.
    fn topic(&self) -> &str;
}
