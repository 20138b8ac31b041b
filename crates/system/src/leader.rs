//! A leading application: saves events, then prompts its followers.

use std::sync::{Arc, Mutex};

use chronicle_application::{Application, ApplicationError, NotificationLog, Recording};
use chronicle_core::Aggregate;

use crate::roles::{Leading, Promptable};

/// Wraps an [`Application`] with a follower registry.
///
/// After each save that stored events, every registered follower receives a
/// prompt carrying this application's name. Prompting is fire-and-forget;
/// followers that are busy coalesce prompts on their side.
pub struct LeaderApplication<A: Aggregate> {
    application: Application<A>,
    followers: Mutex<Vec<Arc<dyn Promptable>>>,
}

impl<A: Aggregate> LeaderApplication<A> {
    pub fn new(application: Application<A>) -> Self {
        Self {
            application,
            followers: Mutex::new(Vec::new()),
        }
    }

    pub fn application(&self) -> &Application<A> {
        &self.application
    }

    /// Save one aggregate and prompt followers.
    pub fn save(&self, aggregate: &mut A) -> Result<Vec<Recording>, ApplicationError> {
        self.save_all(&mut [aggregate])
    }

    /// Save several aggregates atomically and prompt followers.
    pub fn save_all(&self, aggregates: &mut [&mut A]) -> Result<Vec<Recording>, ApplicationError> {
        let recordings = self.application.save_all(aggregates)?;
        if !recordings.is_empty() {
            self.prompt_followers();
        }
        Ok(recordings)
    }

    /// Prompt every registered follower with this application's name.
    ///
    /// The registry is snapshotted first so no lock is held while followers
    /// run (a follower may prompt back into this graph re-entrantly).
    pub fn prompt_followers(&self) {
        let followers: Vec<Arc<dyn Promptable>> = {
            match self.followers.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            }
        };
        for follower in followers {
            follower.receive_prompt(self.application.name());
        }
    }
}

impl<A: Aggregate> Leading for LeaderApplication<A> {
    fn name(&self) -> &str {
        self.application.name()
    }

    fn log(&self) -> Arc<dyn NotificationLog> {
        self.application.log()
    }

    fn lead(&self, follower: Arc<dyn Promptable>) {
        match self.followers.lock() {
            Ok(mut guard) => guard.push(follower),
            Err(poisoned) => poisoned.into_inner().push(follower),
        }
    }
}

impl<A: Aggregate> core::fmt::Debug for LeaderApplication<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LeaderApplication")
            .field("application", &self.application)
            .finish_non_exhaustive()
    }
}
