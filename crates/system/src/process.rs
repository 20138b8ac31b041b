//! Process applications: follow upstream logs, react exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};

use chronicle_application::{Application, NotificationLog, NotificationLogReader};
use chronicle_core::{Aggregate, DomainEvent};
use chronicle_persistence::{Mapper, ProcessRecorder, Tracking};

use crate::error::SystemError;
use crate::leader::LeaderApplication;
use crate::roles::{Following, Leading, Promptable};

/// Collects the reaction to one upstream notification.
///
/// The policy queues reaction events here; they are committed in the same
/// transaction as the tracking marker, so either both land or neither does.
#[derive(Debug)]
pub struct ProcessingEvent<E> {
    reactions: Vec<E>,
    tracking: Tracking,
}

impl<E> ProcessingEvent<E> {
    pub fn new(tracking: Tracking) -> Self {
        Self {
            reactions: Vec::new(),
            tracking,
        }
    }

    /// Queue reaction events for atomic recording.
    pub fn collect(&mut self, events: impl IntoIterator<Item = E>) {
        self.reactions.extend(events);
    }

    /// Drain a reacting aggregate's pending events into this processing
    /// event.
    pub fn collect_from<A>(&mut self, aggregate: &mut A)
    where
        A: Aggregate<Event = E>,
    {
        self.reactions.extend(aggregate.collect_events());
    }

    pub fn tracking(&self) -> &Tracking {
        &self.tracking
    }

    pub(crate) fn into_parts(self) -> (Vec<E>, Tracking) {
        (self.reactions, self.tracking)
    }
}

/// A user-supplied reaction to upstream domain events.
///
/// Policies must be deterministic with respect to the upstream event; they
/// MAY be invoked again for a notification that was already processed (the
/// duplicate commit is rejected), so side effects belong in the collected
/// events, not in the policy body.
pub trait Policy<UE, E>: Send + Sync {
    fn react(&self, event: &UE, ctx: &mut ProcessingEvent<E>) -> Result<(), SystemError>;
}

impl<UE, E, F> Policy<UE, E> for F
where
    F: Fn(&UE, &mut ProcessingEvent<E>) -> Result<(), SystemError> + Send + Sync,
{
    fn react(&self, event: &UE, ctx: &mut ProcessingEvent<E>) -> Result<(), SystemError> {
        self(event, ctx)
    }
}

/// An application that is both a follower of upstream logs and a leader for
/// its own downstream.
///
/// `A` is its own aggregate family, `UE` the upstream event family it
/// consumes.
pub struct ProcessApplication<A: Aggregate, UE: DomainEvent> {
    leader: LeaderApplication<A>,
    recorder: Arc<dyn ProcessRecorder>,
    upstream_mapper: Mapper<UE>,
    policy: Arc<dyn Policy<UE, A::Event>>,
    followed: Mutex<HashMap<String, Arc<dyn NotificationLog>>>,
}

impl<A: Aggregate, UE: DomainEvent> ProcessApplication<A, UE> {
    /// Assemble from an application built over `recorder`
    /// (see `ApplicationBuilder::build_process`).
    pub fn new(
        application: Application<A>,
        recorder: Arc<dyn ProcessRecorder>,
        upstream_mapper: Mapper<UE>,
        policy: impl Policy<UE, A::Event> + 'static,
    ) -> Self {
        Self {
            leader: LeaderApplication::new(application),
            recorder,
            upstream_mapper,
            policy: Arc::new(policy),
            followed: Mutex::new(HashMap::new()),
        }
    }

    pub fn application(&self) -> &Application<A> {
        self.leader.application()
    }

    fn followed_log(&self, upstream_name: &str) -> Option<Arc<dyn NotificationLog>> {
        let followed = match self.followed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        followed.get(upstream_name).cloned()
    }
}

impl<A: Aggregate, UE: DomainEvent> Leading for ProcessApplication<A, UE> {
    fn name(&self) -> &str {
        self.leader.name()
    }

    fn log(&self) -> Arc<dyn NotificationLog> {
        self.leader.log()
    }

    fn lead(&self, follower: Arc<dyn Promptable>) {
        self.leader.lead(follower);
    }
}

impl<A: Aggregate, UE: DomainEvent> Following for ProcessApplication<A, UE> {
    fn follow(&self, upstream_name: &str, log: Arc<dyn NotificationLog>) {
        let mut followed = match self.followed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        followed.insert(upstream_name.to_string(), log);
    }

    /// The core loop: resume from the tracked high-water mark, then for each
    /// unseen notification decode → policy → commit reactions + tracking in
    /// one transaction. A tracking collision means another worker already
    /// processed that notification; it is absorbed and the loop moves on.
    #[instrument(skip(self), fields(application = self.name()), err)]
    fn pull_and_process(&self, upstream_name: &str) -> Result<usize, SystemError> {
        let log = self
            .followed_log(upstream_name)
            .ok_or_else(|| SystemError::NotFollowing(upstream_name.to_string()))?;
        let last = self.recorder.max_tracking_id(upstream_name)?;
        let reader = NotificationLogReader::new(log);

        let mut processed = 0;
        for notification in reader.read(last + 1) {
            let notification = notification.map_err(SystemError::Application)?;
            let event = self.upstream_mapper.from_notification(&notification)?;

            let mut ctx =
                ProcessingEvent::new(Tracking::new(upstream_name, notification.id));
            self.policy.react(&event, &mut ctx)?;

            let (reactions, tracking) = ctx.into_parts();
            let mapper = self.application().events().mapper();
            let items = reactions
                .iter()
                .map(|e| mapper.to_stored(e))
                .collect::<Result<Vec<_>, _>>()?;

            match self.recorder.insert_tracked(&items, Some(tracking)) {
                Ok(_) => {
                    processed += 1;
                    self.leader.prompt_followers();
                }
                Err(e) if e.is_integrity() => {
                    debug!(
                        upstream = upstream_name,
                        notification_id = notification.id,
                        "notification already processed"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(processed)
    }
}

impl<A: Aggregate, UE: DomainEvent> core::fmt::Debug for ProcessApplication<A, UE> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessApplication")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
