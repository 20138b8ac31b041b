//! In-memory recorders.
//!
//! Intended for tests/dev. They honor the full recorder contract, including
//! batch atomicity (uniqueness is checked before anything is mutated) and
//! gap-free notification ids (assigned under the same write guard that
//! performs the append).

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chronicle_core::AggregateId;

use crate::error::PersistenceError;
use crate::item::{Notification, NotificationId, StoredItem, Tracking};
use crate::recorder::{AggregateRecorder, ApplicationRecorder, EventSelect, ProcessRecorder};

fn poisoned() -> PersistenceError {
    PersistenceError::datastore("lock poisoned")
}

/// Reject duplicates inside the batch itself and against a stream lookup.
fn check_batch(
    items: &[StoredItem],
    exists: impl Fn(&StoredItem) -> bool,
) -> Result<(), PersistenceError> {
    let mut seen: BTreeSet<(AggregateId, u64)> = BTreeSet::new();
    for item in items {
        let key = (item.originator_id, item.originator_version);
        if !seen.insert(key) || exists(item) {
            return Err(PersistenceError::integrity(format!(
                "event already recorded at ({}, {})",
                item.originator_id, item.originator_version
            )));
        }
    }
    Ok(())
}

/// Apply range options to one originator's stream.
fn select_from(stream: &[StoredItem], select: &EventSelect) -> Vec<StoredItem> {
    let mut events: Vec<StoredItem> = stream
        .iter()
        .filter(|e| select.gt.is_none_or(|gt| e.originator_version > gt))
        .filter(|e| select.lte.is_none_or(|lte| e.originator_version <= lte))
        .cloned()
        .collect();
    events.sort_by_key(|e| e.originator_version);
    if select.desc {
        events.reverse();
    }
    if let Some(limit) = select.limit {
        events.truncate(limit);
    }
    events
}

/// In-memory per-originator log without a notification sequence.
///
/// This is the recorder used for snapshot sequences.
#[derive(Debug, Default)]
pub struct InMemoryAggregateRecorder {
    streams: RwLock<HashMap<AggregateId, Vec<StoredItem>>>,
}

impl InMemoryAggregateRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateRecorder for InMemoryAggregateRecorder {
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        check_batch(items, |item| {
            streams
                .get(&item.originator_id)
                .is_some_and(|stream| {
                    stream
                        .iter()
                        .any(|e| e.originator_version == item.originator_version)
                })
        })?;
        for item in items {
            streams
                .entry(item.originator_id)
                .or_default()
                .push(item.clone());
        }
        Ok(vec![])
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams
            .get(&originator_id)
            .map(|stream| select_from(stream, select))
            .unwrap_or_default())
    }
}

/// Shared state for recorders that also keep the notification log.
#[derive(Debug, Default)]
struct ApplicationLog {
    streams: HashMap<AggregateId, Vec<StoredItem>>,
    notifications: Vec<Notification>,
    tracking: HashMap<String, BTreeSet<NotificationId>>,
}

impl ApplicationLog {
    /// Validate the whole write, then apply it. Ids are dense because the
    /// caller holds the write guard for the duration.
    fn insert(
        &mut self,
        items: &[StoredItem],
        tracking: Option<&Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError> {
        if let Some(t) = tracking {
            let processed = self
                .tracking
                .get(&t.application_name)
                .is_some_and(|ids| ids.contains(&t.notification_id));
            if processed {
                return Err(PersistenceError::integrity(format!(
                    "notification {} from '{}' already tracked",
                    t.notification_id, t.application_name
                )));
            }
        }
        check_batch(items, |item| {
            self.streams.get(&item.originator_id).is_some_and(|stream| {
                stream
                    .iter()
                    .any(|e| e.originator_version == item.originator_version)
            })
        })?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            self.streams
                .entry(item.originator_id)
                .or_default()
                .push(item.clone());
            let id = self.notifications.len() as NotificationId + 1;
            self.notifications
                .push(Notification::from_item(id, item.clone()));
            ids.push(id);
        }
        if let Some(t) = tracking {
            self.tracking
                .entry(t.application_name.clone())
                .or_default()
                .insert(t.notification_id);
        }
        Ok(ids)
    }

    fn select_notifications(&self, start: NotificationId, limit: usize) -> Vec<Notification> {
        // Ids are dense, so id N sits at index N - 1.
        let first = start.max(1) as usize - 1;
        self.notifications
            .iter()
            .skip(first)
            .take(limit)
            .cloned()
            .collect()
    }

    fn max_notification_id(&self) -> NotificationId {
        self.notifications.len() as NotificationId
    }

    fn max_tracking_id(&self, application_name: &str) -> NotificationId {
        self.tracking
            .get(application_name)
            .and_then(|ids| ids.last().copied())
            .unwrap_or(0)
    }
}

/// In-memory recorder with the global notification log.
#[derive(Debug, Default)]
pub struct InMemoryApplicationRecorder {
    inner: RwLock<ApplicationLog>,
}

impl InMemoryApplicationRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateRecorder for InMemoryApplicationRecorder {
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() {
            return Ok(vec![]);
        }
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.insert(items, None)
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .streams
            .get(&originator_id)
            .map(|stream| select_from(stream, select))
            .unwrap_or_default())
    }
}

impl ApplicationRecorder for InMemoryApplicationRecorder {
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.select_notifications(start, limit))
    }

    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.max_notification_id())
    }
}

/// In-memory recorder with notification log and tracking.
#[derive(Debug, Default)]
pub struct InMemoryProcessRecorder {
    inner: RwLock<ApplicationLog>,
}

impl InMemoryProcessRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateRecorder for InMemoryProcessRecorder {
    fn insert_events(&self, items: &[StoredItem]) -> Result<Vec<NotificationId>, PersistenceError> {
        self.insert_tracked(items, None)
    }

    fn select_events(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<Vec<StoredItem>, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .streams
            .get(&originator_id)
            .map(|stream| select_from(stream, select))
            .unwrap_or_default())
    }
}

impl ApplicationRecorder for InMemoryProcessRecorder {
    fn select_notifications(
        &self,
        start: NotificationId,
        limit: usize,
    ) -> Result<Vec<Notification>, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.select_notifications(start, limit))
    }

    fn max_notification_id(&self) -> Result<NotificationId, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.max_notification_id())
    }
}

impl ProcessRecorder for InMemoryProcessRecorder {
    fn insert_tracked(
        &self,
        items: &[StoredItem],
        tracking: Option<Tracking>,
    ) -> Result<Vec<NotificationId>, PersistenceError> {
        if items.is_empty() && tracking.is_none() {
            return Ok(vec![]);
        }
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.insert(items, tracking.as_ref())
    }

    fn max_tracking_id(
        &self,
        application_name: &str,
    ) -> Result<NotificationId, PersistenceError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.max_tracking_id(application_name))
    }
}
