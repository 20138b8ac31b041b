//! Aggregate reconstitution by replay.

use tracing::instrument;

use chronicle_core::{Aggregate, AggregateId, DomainEvent, Projector, Snapshot, Version};
use chronicle_persistence::{EventSelect, EventStore};

use crate::cache::AggregateCache;
use crate::error::ApplicationError;

/// Reconstitutes aggregates from events, optionally seeded from snapshots
/// and served from a bounded cache.
///
/// Replay is deterministic: for any id and version, two calls yield equal
/// aggregates, and replaying from a snapshot yields the same aggregate as
/// replaying from scratch.
pub struct Repository<A: Aggregate> {
    events: EventStore<A::Event>,
    snapshots: Option<EventStore<Snapshot>>,
    cache: Option<AggregateCache<A>>,
    fastforward: bool,
    projector: Projector<A>,
}

impl<A: Aggregate> Repository<A> {
    pub fn new(events: EventStore<A::Event>) -> Self {
        Self {
            events,
            snapshots: None,
            cache: None,
            fastforward: true,
            projector: Projector::default(),
        }
    }

    pub fn with_snapshots(mut self, snapshots: EventStore<Snapshot>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn with_cache(mut self, cache: AggregateCache<A>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_fastforward(mut self, fastforward: bool) -> Self {
        self.fastforward = fastforward;
        self
    }

    pub fn with_projector(mut self, projector: Projector<A>) -> Self {
        self.projector = projector;
        self
    }

    /// Reconstitute the latest state of an aggregate.
    pub fn get(&self, id: AggregateId) -> Result<A, ApplicationError> {
        self.get_at(id, None)
    }

    /// Reconstitute an aggregate at a version (or latest, when `None`).
    pub fn get_at(&self, id: AggregateId, version: Option<Version>) -> Result<A, ApplicationError> {
        self.get_with(id, version, &self.projector)
    }

    /// Reconstitute with an explicit projector.
    ///
    /// Historic versions always replay cold; the cache only serves and
    /// learns latest state.
    #[instrument(skip(self, projector), fields(aggregate_id = %id), err)]
    pub fn get_with(
        &self,
        id: AggregateId,
        version: Option<Version>,
        projector: &Projector<A>,
    ) -> Result<A, ApplicationError> {
        if version.is_none() {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache.get(id, false) {
                    return self.serve_cached(cache, cached, projector);
                }
            }
        }

        let (mut state, gt) = self.seed_from_snapshot(id, version)?;
        let select = EventSelect {
            gt,
            lte: version,
            desc: false,
            limit: None,
        };
        for event in self.events.get(id, &select)? {
            state = projector.step(state, &event?)?;
        }
        let aggregate = state.ok_or(ApplicationError::AggregateNotFound { id, version })?;

        if version.is_none() {
            if let Some(cache) = &self.cache {
                cache.put_if_newer(aggregate.clone());
            }
        }
        Ok(aggregate)
    }

    /// Bring a cached aggregate up to date with events recorded since it was
    /// cached. If another thread installs a newer entry first, the write-back
    /// is skipped and the state read here is returned as-is.
    fn serve_cached(
        &self,
        cache: &AggregateCache<A>,
        cached: A,
        projector: &Projector<A>,
    ) -> Result<A, ApplicationError> {
        if !self.fastforward {
            return Ok(cached);
        }
        let id = cached.id();
        let select = EventSelect::all().gt(cached.version());
        let mut state = Some(cached);
        for event in self.events.get(id, &select)? {
            state = projector.step(state, &event?)?;
        }
        let aggregate = state.ok_or(ApplicationError::AggregateNotFound { id, version: None })?;
        cache.put_if_newer(aggregate.clone());
        Ok(aggregate)
    }

    /// Seed replay from the newest snapshot at or below the target version.
    fn seed_from_snapshot(
        &self,
        id: AggregateId,
        version: Option<Version>,
    ) -> Result<(Option<A>, Option<Version>), ApplicationError> {
        let Some(snapshots) = &self.snapshots else {
            return Ok((None, None));
        };
        let mut select = EventSelect::all().desc().limit(1);
        if let Some(v) = version {
            select = select.lte(v);
        }
        match snapshots.get(id, &select)?.next() {
            Some(snapshot) => {
                let snapshot = snapshot?;
                let aggregate: A = snapshot.restore()?;
                Ok((Some(aggregate), Some(snapshot.originator_version())))
            }
            None => Ok((None, None)),
        }
    }

    /// Offer freshly committed state to the cache.
    ///
    /// Used by the write path after a successful save. Never moves an entry
    /// backwards, so a stale copy cannot clobber concurrent progress.
    pub fn refresh_cache(&self, aggregate: &A) {
        if let Some(cache) = &self.cache {
            cache.put_if_newer(aggregate.clone());
        }
    }

    pub fn has_snapshots(&self) -> bool {
        self.snapshots.is_some()
    }
}

impl<A: Aggregate> core::fmt::Debug for Repository<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Repository")
            .field("snapshots", &self.snapshots.is_some())
            .field("cached", &self.cache.is_some())
            .field("fastforward", &self.fastforward)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Wallet, WalletEvent};
    use chronicle_persistence::{
        InMemoryAggregateRecorder, InMemoryApplicationRecorder, JsonTranscoder, Mapper,
    };
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    fn event_store() -> EventStore<WalletEvent> {
        EventStore::new(
            Mapper::new(Arc::new(JsonTranscoder::new())),
            Arc::new(InMemoryApplicationRecorder::new()),
        )
    }

    fn snapshot_store() -> EventStore<Snapshot> {
        EventStore::new(
            Mapper::new(Arc::new(JsonTranscoder::new())),
            Arc::new(InMemoryAggregateRecorder::new()),
        )
    }

    fn save(store: &EventStore<WalletEvent>, wallet: &mut Wallet) {
        let events = wallet.collect_events();
        store.put(&events).unwrap();
    }

    #[test]
    fn replays_created_aggregate() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events.clone());
        let replayed = repository.get(wallet.id).unwrap();
        assert_eq!(replayed.version, 1);
        assert_eq!(replayed.owner, "alice");

        wallet.deposit(10);
        save(&events, &mut wallet);
        let replayed = repository.get(wallet.id).unwrap();
        assert_eq!(replayed.version, 2);
        assert_eq!(replayed.balance, 10);
    }

    #[test]
    fn missing_aggregate_is_not_found() {
        let repository = Repository::<Wallet>::new(event_store());
        let err = repository.get(AggregateId::new()).unwrap_err();
        assert!(matches!(err, ApplicationError::AggregateNotFound { .. }));
    }

    #[test]
    fn replays_to_historic_version() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        wallet.deposit(10);
        wallet.deposit(25);
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events);
        let at_two = repository.get_at(wallet.id, Some(2)).unwrap();
        assert_eq!(at_two.version, 2);
        assert_eq!(at_two.balance, 10);
    }

    #[test]
    fn snapshot_seed_equals_cold_replay() {
        let events = event_store();
        let snapshots = snapshot_store();
        let mut wallet = Wallet::open("alice");
        for amount in [1, 2, 3, 4, 5, 6] {
            wallet.deposit(amount);
        }
        save(&events, &mut wallet);

        let cold = Repository::<Wallet>::new(events.clone());
        let seeded = Repository::<Wallet>::new(events).with_snapshots(snapshots.clone());

        // Snapshot at version 5, then replay to latest and to an older
        // version through it.
        let at_five = cold.get_at(wallet.id, Some(5)).unwrap();
        snapshots.put(&[Snapshot::take(&at_five).unwrap()]).unwrap();

        assert_eq!(seeded.get(wallet.id).unwrap(), cold.get(wallet.id).unwrap());
        assert_eq!(
            seeded.get_at(wallet.id, Some(6)).unwrap(),
            cold.get_at(wallet.id, Some(6)).unwrap()
        );
        // A target below the snapshot must not use it.
        assert_eq!(
            seeded.get_at(wallet.id, Some(3)).unwrap(),
            cold.get_at(wallet.id, Some(3)).unwrap()
        );
    }

    #[test]
    fn replay_is_deterministic() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        wallet.deposit(7);
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events);
        assert_eq!(
            repository.get(wallet.id).unwrap(),
            repository.get(wallet.id).unwrap()
        );
    }

    #[test]
    fn cache_fast_forwards_past_external_writes() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        for amount in [1, 1, 1] {
            wallet.deposit(amount);
        }
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events.clone())
            .with_cache(AggregateCache::with_capacity(NonZeroUsize::new(8).unwrap()));

        // Warm the cache at version 4.
        assert_eq!(repository.get(wallet.id).unwrap().version, 4);

        // An external writer appends versions 5 and 6.
        wallet.deposit(10);
        wallet.deposit(20);
        save(&events, &mut wallet);

        let current = repository.get(wallet.id).unwrap();
        assert_eq!(current.version, 6);
        assert_eq!(current.balance, 33);
    }

    #[test]
    fn cache_without_fast_forward_serves_stale_reads() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events.clone())
            .with_cache(AggregateCache::with_capacity(NonZeroUsize::new(8).unwrap()))
            .with_fastforward(false);

        assert_eq!(repository.get(wallet.id).unwrap().version, 1);
        wallet.deposit(5);
        save(&events, &mut wallet);
        // Still the cached version: no fast-forward configured.
        assert_eq!(repository.get(wallet.id).unwrap().version, 1);
    }

    #[test]
    fn historic_reads_bypass_the_cache() {
        let events = event_store();
        let mut wallet = Wallet::open("alice");
        wallet.deposit(10);
        save(&events, &mut wallet);

        let repository = Repository::<Wallet>::new(events)
            .with_cache(AggregateCache::with_capacity(NonZeroUsize::new(8).unwrap()));
        assert_eq!(repository.get(wallet.id).unwrap().version, 2);
        assert_eq!(repository.get_at(wallet.id, Some(1)).unwrap().version, 1);
        // The historic read must not have downgraded the cache.
        assert_eq!(repository.get(wallet.id).unwrap().version, 2);
    }
}
