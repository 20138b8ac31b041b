//! The recorder contract: durable append-only storage.
//!
//! Three capability levels form a hierarchy. Any backend honoring these
//! contracts is acceptable; the library ships an in-memory implementation
//! ([`crate::memory`]) and database drivers live in their own crates.
//!
//! All methods are blocking. Backends own their own connections; the core
//! never shares them across applications.

use std::sync::Arc;

use chronicle_core::{AggregateId, Version};

use crate::error::PersistenceError;
use crate::item::{Notification, NotificationId, StoredItem, Tracking};

/// Range options for reading an originator's event sequence.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct EventSelect {
    /// Only events with `originator_version > gt`.
    pub gt: Option<Version>,
    /// Only events with `originator_version <= lte`.
    pub lte: Option<Version>,
    /// Descending version order instead of ascending.
    pub desc: bool,
    /// At most this many events. `Some(0)` selects nothing.
    pub limit: Option<usize>,
}

impl EventSelect {
    /// The whole sequence, ascending.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn gt(mut self, version: Version) -> Self {
        self.gt = Some(version);
        self
    }

    pub fn lte(mut self, version: Version) -> Self {
        self.lte = Some(version);
        self
    }

    pub fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A per-originator, monotonically versioned append-only log.
pub trait AggregateRecorder: Send + Sync {
    /// Atomically append a batch of items spanning one or many aggregates.
    ///
    /// Fails with [`PersistenceError::Integrity`] if any
    /// `(originator_id, originator_version)` already exists; the batch then
    /// has no visible effect. Two concurrent inserts of the same pair yield
    /// exactly one success.
    ///
    /// Recorders with a notification log return the assigned notification
    /// ids, one per item in item order; plain aggregate recorders return an
    /// empty vector.
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError>;

    /// Read an originator's events within the given range.
    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError>;
}

/// Adds the process-wide notification log derived from the same writes.
///
/// Every inserted event produces exactly one notification whose id is the
/// next integer after the current maximum, assigned atomically with the
/// insert. The id sequence is dense: holes from aborted transactions are a
/// contract violation.
pub trait ApplicationRecorder: AggregateRecorder {
    /// Notifications with `id >= start`, ascending, at most `limit`.
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError>;

    /// Highest assigned notification id, 0 when the log is empty.
    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError>;
}

/// Adds tracking of processed upstream notifications.
pub trait ProcessRecorder: ApplicationRecorder {
    /// In one transaction: insert items, their notifications, and the
    /// tracking row.
    ///
    /// A duplicate `(application_name, notification_id)` tracking key fails
    /// the whole call with [`PersistenceError::Integrity`], leaving nothing
    /// visible. This is what makes downstream processing idempotent.
    fn insert_tracked(
        &self,
        items: &[StoredItem],
        tracking: Option<Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError>;

    /// Highest tracked notification id for an upstream, 0 when none.
    fn max_tracking_id(
        &self,
        application_name: &str,
    ) -> Result<NotificationId, PersistenceError>;
}

impl<R> AggregateRecorder for Arc<R>
where
    R: AggregateRecorder + ?Sized,
{
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        (**self).insert_events(items)
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        (**self).select_events(originator_id, select)
    }
}

impl<R> ApplicationRecorder for Arc<R>
where
    R: ApplicationRecorder + ?Sized,
{
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        (**self).select_notifications(start, limit)
    }

    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError> {
        (**self).max_notification_id()
    }
}

impl<R> ProcessRecorder for Arc<R>
where
    R: ProcessRecorder + ?Sized,
{
    fn insert_tracked(
        &self,
        items: &[StoredItem],
        tracking: Option<Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError> {
        (**self).insert_tracked(items, tracking)
    }

    fn max_tracking_id(
        &self,
        application_name: &str,
    ) -> Result<NotificationId, PersistenceError> {
        (**self).max_tracking_id(application_name)
    }
}
