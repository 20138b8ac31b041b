//! One bounded context: stores, repository, notification log, save path.

use std::sync::Arc;

use tracing::{debug, instrument};

use chronicle_core::{Aggregate, AggregateId, DomainEvent, Projector, Snapshot, Version};
use chronicle_persistence::{ApplicationRecorder, EventStore, Notification};

use crate::env::Env;
use crate::error::ApplicationError;
use crate::notification_log::LocalNotificationLog;
use crate::repository::Repository;

/// The outcome of saving one event: its assigned notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub notification: Notification,
}

pub(crate) type NotifyHook<E> = Arc<dyn Fn(&[E]) + Send + Sync>;

/// An event-sourced application for one aggregate family.
///
/// Binds mapper, recorder, event stores, repository and notification log.
/// Constructed through [`crate::ApplicationBuilder`].
pub struct Application<A: Aggregate> {
    name: String,
    env: Env,
    recorder: Arc<dyn ApplicationRecorder>,
    events: EventStore<A::Event>,
    snapshots: Option<EventStore<Snapshot>>,
    repository: Repository<A>,
    log: Arc<LocalNotificationLog>,
    snapshotting_interval: Option<Version>,
    notify_hook: Option<NotifyHook<A::Event>>,
}

impl<A: Aggregate> Application<A> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assembled(
        name: String,
        env: Env,
        recorder: Arc<dyn ApplicationRecorder>,
        events: EventStore<A::Event>,
        snapshots: Option<EventStore<Snapshot>>,
        repository: Repository<A>,
        log: Arc<LocalNotificationLog>,
        snapshotting_interval: Option<Version>,
        notify_hook: Option<NotifyHook<A::Event>>,
    ) -> Self {
        Self {
            name,
            env,
            recorder,
            events,
            snapshots,
            repository,
            log,
            snapshotting_interval,
            notify_hook,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn recorder(&self) -> &Arc<dyn ApplicationRecorder> {
        &self.recorder
    }

    pub fn events(&self) -> &EventStore<A::Event> {
        &self.events
    }

    pub fn snapshots(&self) -> Option<&EventStore<Snapshot>> {
        self.snapshots.as_ref()
    }

    pub fn repository(&self) -> &Repository<A> {
        &self.repository
    }

    pub fn log(&self) -> Arc<LocalNotificationLog> {
        Arc::clone(&self.log)
    }

    /// Save one aggregate's pending events.
    pub fn save(&self, aggregate: &mut A) -> Result<Vec<Recording>, ApplicationError> {
        self.save_all(&mut [aggregate])
    }

    /// Save several aggregates' pending events in one atomic write.
    ///
    /// Pending events are drained in aggregate order and stored in a single
    /// recorder insert, so their notifications are contiguous and either the
    /// whole batch commits or nothing does. An optimistic-concurrency
    /// collision propagates as an integrity conflict; the caller may reload
    /// and retry.
    #[instrument(skip_all, fields(application = %self.name), err)]
    pub fn save_all(&self, aggregates: &mut [&mut A]) -> Result<Vec<Recording>, ApplicationError> {
        let mut events: Vec<A::Event> = Vec::new();
        for aggregate in aggregates.iter_mut() {
            events.extend(aggregate.collect_events());
        }
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let notifications = self.events.put(&events)?;

        // Offer the committed state to the cache. Stale copies lose.
        for aggregate in aggregates.iter() {
            self.repository.refresh_cache(aggregate);
        }

        if self.snapshots.is_some() {
            if let Some(interval) = self.snapshotting_interval {
                for event in &events {
                    if event.originator_version() % interval == 0 {
                        self.take_snapshot(
                            event.originator_id(),
                            Some(event.originator_version()),
                        )?;
                    }
                }
            }
        }

        if let Some(hook) = &self.notify_hook {
            hook(&events);
        }

        debug!(events = events.len(), "saved");
        Ok(notifications
            .into_iter()
            .map(|notification| Recording { notification })
            .collect())
    }

    /// Capture the recorded state of an aggregate as a snapshot.
    ///
    /// Replays to `version` (or latest), then writes the snapshot to the
    /// snapshot sequence. Returns the snapshotted version.
    pub fn take_snapshot(
        &self,
        aggregate_id: AggregateId,
        version: Option<Version>,
    ) -> Result<Version, ApplicationError> {
        self.snapshot_with(aggregate_id, version, None)
    }

    /// Like [`take_snapshot`](Self::take_snapshot), replaying through a
    /// custom projector.
    pub fn take_snapshot_with(
        &self,
        aggregate_id: AggregateId,
        version: Option<Version>,
        projector: &Projector<A>,
    ) -> Result<Version, ApplicationError> {
        self.snapshot_with(aggregate_id, version, Some(projector))
    }

    fn snapshot_with(
        &self,
        aggregate_id: AggregateId,
        version: Option<Version>,
        projector: Option<&Projector<A>>,
    ) -> Result<Version, ApplicationError> {
        let snapshots = self.snapshots.as_ref().ok_or_else(|| {
            ApplicationError::programming(
                "can't take snapshot without a snapshot store; set the environment \
                 variable IS_SNAPSHOTTING_ENABLED to a truthy value (e.g. 'y') or \
                 configure a snapshotting interval on the application builder",
            )
        })?;
        let aggregate = match projector {
            Some(projector) => self.repository.get_with(aggregate_id, version, projector)?,
            None => self.repository.get_at(aggregate_id, version)?,
        };
        let snapshot = Snapshot::take(&aggregate)?;
        snapshots.put(std::slice::from_ref(&snapshot))?;
        Ok(aggregate.version())
    }
}

impl<A: Aggregate> core::fmt::Debug for Application<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("snapshotting_interval", &self.snapshotting_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ApplicationBuilder;
    use crate::env::keys;
    use crate::notification_log::NotificationLog;
    use crate::test_support::Wallet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn application() -> Application<Wallet> {
        ApplicationBuilder::new("wallets").build().unwrap()
    }

    #[test]
    fn save_assigns_contiguous_notifications() {
        let app = application();
        let mut alice = Wallet::open("alice");
        alice.deposit(10);
        let mut bob = Wallet::open("bob");

        let recordings = app.save_all(&mut [&mut alice, &mut bob]).unwrap();
        let ids: Vec<u64> = recordings.iter().map(|r| r.notification.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(recordings[0].notification.topic, "wallet.opened");
        assert_eq!(recordings[2].notification.originator_id, bob.id);
    }

    #[test]
    fn saving_nothing_records_nothing() {
        let app = application();
        let mut wallet = Wallet::open("alice");
        assert_eq!(app.save(&mut wallet).unwrap().len(), 1);

        // No new pending events: no new notifications.
        assert!(app.save(&mut wallet).unwrap().is_empty());
        assert_eq!(app.recorder().max_notification_id().unwrap(), 1);
    }

    #[test]
    fn optimistic_concurrency_conflict_surfaces_as_integrity() {
        let app = application();
        let shared = Wallet::open("alice");
        let mut first = shared.clone();
        let mut second = shared;

        assert_eq!(app.save(&mut first).unwrap().len(), 1);
        let err = app.save(&mut second).unwrap_err();
        assert!(err.is_integrity_conflict());
        // Exactly one creation event exists.
        assert_eq!(app.recorder().max_notification_id().unwrap(), 1);
    }

    #[test]
    fn take_snapshot_without_store_is_a_programming_error() {
        let app = application();
        let mut wallet = Wallet::open("alice");
        app.save(&mut wallet).unwrap();

        let err = app.take_snapshot(wallet.id, None).unwrap_err();
        assert!(matches!(err, ApplicationError::Programming(_)));
    }

    #[test]
    fn snapshot_round_trip_matches_cold_replay() {
        let env = Env::from_iter([(keys::IS_SNAPSHOTTING_ENABLED, "y")]);
        let app = ApplicationBuilder::<Wallet>::new("wallets")
            .env(env)
            .build()
            .unwrap();

        let mut wallet = Wallet::open("alice");
        for _ in 0..7 {
            wallet.deposit(5);
        }
        app.save(&mut wallet).unwrap();

        assert_eq!(app.take_snapshot(wallet.id, Some(5)).unwrap(), 5);

        let warm = app.repository().get(wallet.id).unwrap();
        assert_eq!(warm.version, 8);
        assert_eq!(warm.balance, 35);
    }

    #[test]
    fn interval_snapshotting_happens_on_save() {
        let app = ApplicationBuilder::<Wallet>::new("wallets")
            .snapshotting_interval(2)
            .build()
            .unwrap();

        let mut wallet = Wallet::open("alice");
        wallet.deposit(1);
        wallet.deposit(2);
        app.save(&mut wallet).unwrap();

        // Versions 1..=3 were saved; a snapshot exists at version 2.
        let snapshots: Vec<_> = app
            .snapshots()
            .unwrap()
            .get(wallet.id, &chronicle_persistence::EventSelect::all())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].originator_version(), 2);
    }

    #[test]
    fn notify_hook_sees_saved_events() {
        let seen = std::sync::Arc::new(AtomicUsize::new(0));
        let seen_in_hook = std::sync::Arc::clone(&seen);
        let app = ApplicationBuilder::<Wallet>::new("wallets")
            .on_notify(move |events| {
                seen_in_hook.fetch_add(events.len(), Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let mut wallet = Wallet::open("alice");
        wallet.deposit(1);
        app.save(&mut wallet).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notification_log_serves_saved_events() {
        let app = application();
        let mut wallet = Wallet::open("alice");
        wallet.deposit(10);
        wallet.deposit(25);
        wallet.deposit(30);
        app.save(&mut wallet).unwrap();

        let section = app.log().section("1,10").unwrap();
        assert_eq!(section.items.len(), 4);
        assert_eq!(section.id.as_deref(), Some("1,4"));
    }

    #[test]
    fn concurrent_saves_produce_one_winner_per_version() {
        let app = std::sync::Arc::new(application());
        let mut wallet = Wallet::open("alice");
        app.save(&mut wallet).unwrap();

        // Both workers hold version 1 and race to append version 2.
        let outcomes = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let app = std::sync::Arc::clone(&app);
            let outcomes = std::sync::Arc::clone(&outcomes);
            let mut copy = wallet.clone();
            handles.push(std::thread::spawn(move || {
                copy.deposit(10);
                let result = app.save(&mut copy);
                outcomes.lock().unwrap().push(result.is_ok());
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        assert_eq!(app.repository().get(wallet.id).unwrap().version, 2);
    }
}
