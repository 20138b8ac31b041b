//! Typed facade over a mapper and a recorder.

use std::sync::Arc;

use chronicle_core::{AggregateId, DomainEvent};

use crate::error::PersistenceError;
use crate::item::Notification;
use crate::mapper::Mapper;
use crate::recorder::{AggregateRecorder, EventSelect};

/// Stores and retrieves one event family through a recorder.
///
/// The store performs no ordering or gap-detection logic of its own; it
/// trusts the recorder's contract.
pub struct EventStore<E: DomainEvent> {
    mapper: Mapper<E>,
    recorder: Arc<dyn AggregateRecorder>,
}

impl<E: DomainEvent> EventStore<E> {
    pub fn new(mapper: Mapper<E>, recorder: Arc<dyn AggregateRecorder>) -> Self {
        Self { mapper, recorder }
    }

    pub fn mapper(&self) -> &Mapper<E> {
        &self.mapper
    }

    /// Map events to stored items and append them atomically.
    ///
    /// Returns one notification per event when the backing recorder keeps a
    /// notification log, and an empty vector otherwise (snapshot sequences).
    pub fn put(&self, events: &[E]) -> Result<Vec<Notification>, PersistenceError> {
        let items = events
            .iter()
            .map(|e| self.mapper.to_stored(e))
            .collect::<Result<Vec<_>, _>>()?;
        let ids = self.recorder.insert_events(&items)?;
        Ok(ids
            .into_iter()
            .zip(items)
            .map(|(id, item)| Notification::from_item(id, item))
            .collect())
    }

    /// Read an originator's events within the given range.
    ///
    /// The returned iterator is finite and not restartable; each element is
    /// mapped back from storage on demand, so decode failures surface as the
    /// iterator is driven.
    pub fn get(
        &self,
        originator_id: AggregateId,
        select: &EventSelect,
    ) -> Result<EventIter<E>, PersistenceError> {
        let items = self.recorder.select_events(originator_id, select)?;
        Ok(EventIter {
            mapper: self.mapper.clone(),
            items: items.into_iter(),
        })
    }
}

impl<E: DomainEvent> Clone for EventStore<E> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            recorder: Arc::clone(&self.recorder),
        }
    }
}

impl<E: DomainEvent> core::fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventStore")
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

/// Lazily decoded sequence of events.
pub struct EventIter<E: DomainEvent> {
    mapper: Mapper<E>,
    items: std::vec::IntoIter<crate::item::StoredItem>,
}

impl<E: DomainEvent> Iterator for EventIter<E> {
    type Item = Result<E, PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(|item| self.mapper.from_stored(&item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryApplicationRecorder;
    use crate::transcoder::JsonTranscoder;
    use chrono::{DateTime, Utc};
    use chronicle_core::Version;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ticked {
        originator_id: AggregateId,
        originator_version: Version,
        at: DateTime<Utc>,
    }

    impl DomainEvent for Ticked {
        fn originator_id(&self) -> AggregateId {
            self.originator_id
        }

        fn originator_version(&self) -> Version {
            self.originator_version
        }

        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }

        fn topic(&self) -> &str {
            "test.ticked"
        }
    }

    fn store() -> EventStore<Ticked> {
        EventStore::new(
            Mapper::new(std::sync::Arc::new(JsonTranscoder::new())),
            Arc::new(InMemoryApplicationRecorder::new()),
        )
    }

    fn ticks(id: AggregateId, versions: std::ops::RangeInclusive<u64>) -> Vec<Ticked> {
        versions
            .map(|v| Ticked {
                originator_id: id,
                originator_version: v,
                at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = store();
        let id = AggregateId::new();
        let events = ticks(id, 1..=3);

        let notifications = store.put(&events).unwrap();
        assert_eq!(
            notifications.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let replayed: Vec<Ticked> = store
            .get(id, &EventSelect::all())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(replayed, events);
    }

    #[test]
    fn put_of_nothing_is_a_no_op() {
        let store = store();
        assert!(store.put(&[]).unwrap().is_empty());
    }

    #[test]
    fn duplicate_put_propagates_integrity() {
        let store = store();
        let id = AggregateId::new();
        store.put(&ticks(id, 1..=1)).unwrap();
        assert!(store.put(&ticks(id, 1..=1)).unwrap_err().is_integrity());
    }

    #[test]
    fn range_options_pass_through() {
        let store = store();
        let id = AggregateId::new();
        store.put(&ticks(id, 1..=5)).unwrap();

        let mut iter = store.get(id, &EventSelect::all().gt(3)).unwrap();
        assert_eq!(iter.next().unwrap().unwrap().originator_version, 4);
        assert_eq!(iter.next().unwrap().unwrap().originator_version, 5);
        assert!(iter.next().is_none());
    }
}
