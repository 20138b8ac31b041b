//! Pipeline error model.

use thiserror::Error;

use chronicle_application::ApplicationError;
use chronicle_persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("runner already started")]
    AlreadyStarted,

    /// An edge targets a node that cannot follow.
    #[error("not a follower: {0}")]
    NotAFollower(String),

    /// A pipe references a node that was never registered.
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// `pull_and_process` was called for an upstream that was never
    /// followed.
    #[error("not following upstream: {0}")]
    NotFollowing(String),

    /// A processing policy rejected an upstream event.
    #[error("policy failed: {0}")]
    Policy(String),

    /// A worker thread could not be spawned.
    #[error("worker thread failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl SystemError {
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }
}

impl From<PersistenceError> for SystemError {
    fn from(e: PersistenceError) -> Self {
        Self::Application(e.into())
    }
}
