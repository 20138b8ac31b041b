//! Processing pipelines: leaders, followers, systems and runners.
//!
//! A [`ProcessApplication`] follows upstream notification logs and applies a
//! [`Policy`] to each notification, recording reaction events atomically with
//! a tracking marker, so every upstream notification is processed exactly
//! once, even across crashes and concurrent workers. A [`System`] wires
//! applications into a DAG, and a runner delivers prompts between them,
//! either cooperatively on one thread or with a worker thread per follower.

pub mod error;
pub mod leader;
pub mod process;
pub mod roles;
pub mod runner;
pub mod system;

pub use error::SystemError;
pub use leader::LeaderApplication;
pub use process::{Policy, ProcessApplication, ProcessingEvent};
pub use roles::{Following, Leading, Promptable};
pub use runner::{MultiThreadedRunner, SingleThreadedRunner};
pub use system::{System, SystemBuilder, SystemNode};
