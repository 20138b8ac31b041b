//! Bounded in-memory aggregate cache.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

use chronicle_core::{Aggregate, AggregateId};

/// LRU cache of reconstituted aggregates, safe for concurrent use.
///
/// The cache holds committed state only. Writers install entries through
/// [`put_if_newer`](Self::put_if_newer), which refuses to move an entry
/// backwards: when two threads race to fast-forward the same aggregate, at
/// most one write-back wins and stale copies never clobber newer ones.
#[derive(Debug)]
pub struct AggregateCache<A: Aggregate> {
    entries: Mutex<LruCache<AggregateId, A>>,
}

impl<A: Aggregate> AggregateCache<A> {
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache operations never leave partial state, so a poisoned lock is
    /// recoverable.
    fn lock(&self) -> MutexGuard<'_, LruCache<AggregateId, A>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up an entry; with `evict` the entry is removed and returned.
    pub fn get(&self, id: AggregateId, evict: bool) -> Option<A> {
        let mut entries = self.lock();
        if evict {
            entries.pop(&id)
        } else {
            entries.get(&id).cloned()
        }
    }

    /// Install an entry unconditionally.
    ///
    /// Returns the least-recently-used entry pushed out by this insert, if
    /// the cache was at capacity.
    pub fn put(&self, aggregate: A) -> Option<(AggregateId, A)> {
        let id = aggregate.id();
        self.lock()
            .push(id, aggregate)
            .filter(|(evicted_id, _)| *evicted_id != id)
    }

    /// Install an entry only if it is newer than what is cached.
    ///
    /// Returns whether the entry was installed. Losing a fast-forward race
    /// is not an error; the loser simply keeps what it read.
    pub fn put_if_newer(&self, aggregate: A) -> bool {
        let id = aggregate.id();
        let mut entries = self.lock();
        let newer = entries
            .peek(&id)
            .is_none_or(|cached| aggregate.version() > cached.version());
        if newer {
            entries.push(id, aggregate);
        }
        newer
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use chronicle_core::{DomainEvent, Version, VersionError};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Stub {
        id: AggregateId,
        version: Version,
        at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    enum StubEvent {}

    impl DomainEvent for StubEvent {
        fn originator_id(&self) -> AggregateId {
            match *self {}
        }

        fn originator_version(&self) -> Version {
            match *self {}
        }

        fn timestamp(&self) -> DateTime<Utc> {
            match *self {}
        }

        fn topic(&self) -> &str {
            match *self {}
        }
    }

    impl Aggregate for Stub {
        type Event = StubEvent;

        const TOPIC: &'static str = "test.stub";

        fn id(&self) -> AggregateId {
            self.id
        }

        fn version(&self) -> Version {
            self.version
        }

        fn created_on(&self) -> DateTime<Utc> {
            self.at
        }

        fn modified_on(&self) -> DateTime<Utc> {
            self.at
        }

        fn from_event(_event: &StubEvent) -> Option<Self> {
            None
        }

        fn apply(&mut self, _event: &StubEvent) -> Result<(), VersionError> {
            Ok(())
        }

        fn collect_events(&mut self) -> Vec<StubEvent> {
            Vec::new()
        }
    }

    fn stub(id: AggregateId, version: Version) -> Stub {
        Stub {
            id,
            version,
            at: Utc::now(),
        }
    }

    fn cache(capacity: usize) -> AggregateCache<Stub> {
        AggregateCache::with_capacity(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn put_and_get() {
        let cache = cache(4);
        let id = AggregateId::new();
        assert!(cache.put(stub(id, 1)).is_none());
        assert_eq!(cache.get(id, false).unwrap().version, 1);
    }

    #[test]
    fn get_with_evict_removes_the_entry() {
        let cache = cache(4);
        let id = AggregateId::new();
        cache.put(stub(id, 1));
        assert!(cache.get(id, true).is_some());
        assert!(cache.get(id, false).is_none());
    }

    #[test]
    fn put_at_capacity_returns_the_evicted_entry() {
        let cache = cache(2);
        let first = AggregateId::new();
        let second = AggregateId::new();
        let third = AggregateId::new();
        cache.put(stub(first, 1));
        cache.put(stub(second, 1));

        let evicted = cache.put(stub(third, 1)).unwrap();
        assert_eq!(evicted.0, first);
        assert!(cache.get(first, false).is_none());
        assert!(cache.get(second, false).is_some());
    }

    #[test]
    fn replacing_an_entry_is_not_an_eviction() {
        let cache = cache(1);
        let id = AggregateId::new();
        cache.put(stub(id, 1));
        assert!(cache.put(stub(id, 2)).is_none());
        assert_eq!(cache.get(id, false).unwrap().version, 2);
    }

    #[test]
    fn put_if_newer_refuses_to_go_backwards() {
        let cache = cache(4);
        let id = AggregateId::new();
        assert!(cache.put_if_newer(stub(id, 4)));
        assert!(!cache.put_if_newer(stub(id, 3)));
        assert!(!cache.put_if_newer(stub(id, 4)));
        assert!(cache.put_if_newer(stub(id, 6)));
        assert_eq!(cache.get(id, false).unwrap().version, 6);
    }
}
