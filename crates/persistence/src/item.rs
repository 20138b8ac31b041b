//! Wire records: what recorders actually store.

use serde::{Deserialize, Serialize};

use chronicle_core::{AggregateId, Version};

/// Globally ordered position in an application's notification log.
///
/// Strictly increasing and dense: the recorder assigns `max + 1 ..= max + N`
/// to each committed batch of N events, and a failed insert leaves no hole.
pub type NotificationId = u64;

/// An event in stored form: metadata columns plus an opaque state payload.
///
/// The `state` bytes are whatever the mapper produced: serialized, possibly
/// compressed, possibly encrypted. Recorders never look inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub originator_id: AggregateId,
    pub originator_version: Version,
    pub topic: String,
    pub state: Vec<u8>,
}

/// A stored event copied into the global notification sequence, identified
/// by a gap-free integer id assigned at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub originator_id: AggregateId,
    pub originator_version: Version,
    pub topic: String,
    pub state: Vec<u8>,
}

impl Notification {
    /// Pair a stored item with its assigned notification id.
    pub fn from_item(id: NotificationId, item: StoredItem) -> Self {
        Self {
            id,
            originator_id: item.originator_id,
            originator_version: item.originator_version,
            topic: item.topic,
            state: item.state,
        }
    }

    /// View this notification as the stored item it was copied from.
    pub fn as_item(&self) -> StoredItem {
        StoredItem {
            originator_id: self.originator_id,
            originator_version: self.originator_version,
            topic: self.topic.clone(),
            state: self.state.clone(),
        }
    }
}

/// A follower's durable record that it processed an upstream notification.
///
/// Inserted in the same transaction as the reaction events it justifies;
/// the `(application_name, notification_id)` pair is unique, which is what
/// makes downstream processing exactly-once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tracking {
    pub application_name: String,
    pub notification_id: NotificationId,
}

impl Tracking {
    pub fn new(application_name: impl Into<String>, notification_id: NotificationId) -> Self {
        Self {
            application_name: application_name.into(),
            notification_id,
        }
    }
}
