//! PostgreSQL-backed recorders.
//!
//! Implements the full recorder hierarchy over an `sqlx` connection pool.
//! Uniqueness of `(originator_id, originator_version)` and of tracking rows
//! is enforced by database constraints inside the insert transaction;
//! notification ids are assigned under an exclusive table lock so the
//! sequence stays gap-free even across aborted transactions.
//!
//! The recorder traits are synchronous; these implementations bridge to
//! async sqlx with the current tokio runtime handle, so they must be driven
//! from threads that are not themselves running the async executor.

pub mod factory;
pub mod recorder;

pub use factory::{POSTGRES_DSN, PostgresFactory};
pub use recorder::{
    PostgresAggregateRecorder, PostgresApplicationRecorder, PostgresProcessRecorder,
};
