//! Notification logs over HTTP/JSON.
//!
//! The [`server`] module presents a [`LocalNotificationLog`] as JSON
//! sections; the [`client`] module consumes such an endpoint through the
//! same [`NotificationLog`] trait the local log implements, preserving
//! section and select semantics exactly.
//!
//! [`LocalNotificationLog`]: chronicle_application::LocalNotificationLog
//! [`NotificationLog`]: chronicle_application::NotificationLog

pub mod client;
pub mod server;
pub mod wire;

pub use client::RemoteNotificationLog;
pub use server::{router, serve};
pub use wire::{NotificationDto, SectionDto};
