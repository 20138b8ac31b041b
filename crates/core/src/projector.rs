//! Replay fold: events in, aggregate state out.

use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::error::VersionError;
use crate::event::DomainEvent;

/// The mutator signature: fold one event into optional state.
///
/// `None` state means "not created yet"; the creation event produces the
/// first `Some`.
pub type Mutator<A> = dyn Fn(Option<A>, &<A as Aggregate>::Event) -> Result<Option<A>, VersionError>
    + Send
    + Sync;

/// A fold function `(state, events) -> state` used to reconstitute
/// aggregates.
///
/// The default projector constructs state from the creation event and applies
/// every later event through [`Aggregate::apply`]. Custom projectors can be
/// supplied per replay, e.g. to project onto alternative state shapes.
pub struct Projector<A: Aggregate> {
    mutator: Arc<Mutator<A>>,
}

impl<A: Aggregate> Projector<A> {
    pub fn new(
        mutator: impl Fn(Option<A>, &A::Event) -> Result<Option<A>, VersionError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            mutator: Arc::new(mutator),
        }
    }

    /// Fold a single event into the state.
    pub fn step(&self, state: Option<A>, event: &A::Event) -> Result<Option<A>, VersionError> {
        (self.mutator)(state, event)
    }

    /// Fold a sequence of events into the state.
    pub fn project<'a>(
        &self,
        mut state: Option<A>,
        events: impl IntoIterator<Item = &'a A::Event>,
    ) -> Result<Option<A>, VersionError> {
        for event in events {
            state = self.step(state, event)?;
        }
        Ok(state)
    }
}

impl<A: Aggregate> Default for Projector<A> {
    fn default() -> Self {
        Self::new(default_mutator::<A>)
    }
}

impl<A: Aggregate> Clone for Projector<A> {
    fn clone(&self) -> Self {
        Self {
            mutator: Arc::clone(&self.mutator),
        }
    }
}

impl<A: Aggregate> core::fmt::Debug for Projector<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

/// Default fold: creation events construct, later events apply.
pub fn default_mutator<A: Aggregate>(
    state: Option<A>,
    event: &A::Event,
) -> Result<Option<A>, VersionError> {
    match state {
        None => match A::from_event(event) {
            Some(aggregate) => Ok(Some(aggregate)),
            None => Err(VersionError {
                originator_id: event.originator_id(),
                expected: 1,
                found: event.originator_version(),
            }),
        },
        Some(mut aggregate) => {
            aggregate.apply(event)?;
            Ok(Some(aggregate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Counter;

    #[test]
    fn replays_events_into_equal_state() {
        let mut counter = Counter::start();
        counter.increment(3);
        counter.increment(4);
        let events = counter.collect_events();

        let projector = Projector::<Counter>::default();
        let replayed = projector.project(None, events.iter()).unwrap().unwrap();

        assert_eq!(replayed.version, 3);
        assert_eq!(replayed.total, 7);
        assert_eq!(replayed.id, counter.id);
    }

    #[test]
    fn rejects_out_of_order_events() {
        let mut counter = Counter::start();
        counter.increment(1);
        counter.increment(2);
        let events = counter.collect_events();

        // Skip the middle event: version 3 cannot follow version 1.
        let projector = Projector::<Counter>::default();
        let err = projector
            .project(None, [&events[0], &events[2]])
            .unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.found, 3);
    }

    #[test]
    fn non_creation_event_cannot_seed_state() {
        let mut counter = Counter::start();
        counter.increment(1);
        let events = counter.collect_events();

        let projector = Projector::<Counter>::default();
        assert!(projector.project(None, [&events[1]]).is_err());
    }

    #[test]
    fn custom_mutator_is_used() {
        let counter = {
            let mut c = Counter::start();
            c.increment(10);
            c
        };
        let events = {
            let mut c = counter.clone();
            c.collect_events()
        };

        // A projector that ignores increments entirely.
        let projector = Projector::<Counter>::new(|state, event| match state {
            None => Ok(Counter::from_event(event)),
            Some(mut c) => {
                c.version = event.originator_version();
                Ok(Some(c))
            }
        });
        let replayed = projector.project(None, events.iter()).unwrap().unwrap();
        assert_eq!(replayed.total, 0);
        assert_eq!(replayed.version, 2);
    }
}
