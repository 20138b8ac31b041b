//! Application layer: repositories, caches, notification logs, applications.
//!
//! An [`Application`] binds one bounded context: it assembles a mapper, a
//! recorder, event stores, a [`Repository`] and a [`LocalNotificationLog`],
//! and exposes `save` / `take_snapshot` / a notify hook. Construction is
//! driven by an environment-shaped key/value map ([`Env`]) resolved through
//! an explicit [`FactoryRegistry`]; no reflection, no global state.

pub mod application;
pub mod builder;
pub mod cache;
pub mod env;
pub mod error;
pub mod factory;
pub mod notification_log;
pub mod repository;

#[cfg(test)]
pub(crate) mod test_support;

pub use application::{Application, Recording};
pub use builder::ApplicationBuilder;
pub use cache::AggregateCache;
pub use env::{Env, keys};
pub use error::ApplicationError;
pub use factory::{FactoryRegistry, InfrastructureFactory, MemoryFactory};
pub use notification_log::{
    DEFAULT_SECTION_SIZE, LocalNotificationLog, NotificationLog, NotificationLogReader, Section,
};
pub use repository::Repository;
