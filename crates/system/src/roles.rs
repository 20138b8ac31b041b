//! Roles in the processing graph.

use std::sync::Arc;

use chronicle_application::NotificationLog;

use crate::error::SystemError;

/// Something that can be told "your upstream has news".
///
/// Prompts carry only the leader's name; followers pull the actual
/// notifications themselves, so a lost-then-repeated prompt is harmless.
pub trait Promptable: Send + Sync {
    fn receive_prompt(&self, leader_name: &str);
}

/// An application that can lead: it exposes a notification log and prompts
/// registered followers after saving.
pub trait Leading: Send + Sync {
    fn name(&self) -> &str;

    fn log(&self) -> Arc<dyn NotificationLog>;

    /// Register a follower to be prompted after each save.
    fn lead(&self, follower: Arc<dyn Promptable>);
}

/// An application that can follow upstream notification logs.
pub trait Following: Leading {
    /// Register an upstream by name with a view of its notification log.
    fn follow(&self, upstream_name: &str, log: Arc<dyn NotificationLog>);

    /// Pull unseen notifications from the named upstream and process each in
    /// ascending id order. Returns how many were newly processed.
    fn pull_and_process(&self, upstream_name: &str) -> Result<usize, SystemError>;
}
