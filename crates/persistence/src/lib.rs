//! Persistence machinery: records, codecs, recorders, event stores.
//!
//! Events travel to storage as opaque [`StoredItem`]s produced by a
//! [`Mapper`] (serialize, optionally compress, optionally encrypt). Durable
//! append-only storage is abstracted behind the recorder trait hierarchy:
//!
//! - [`AggregateRecorder`]: a per-originator, monotonically versioned log
//! - [`ApplicationRecorder`]: adds a process-wide, gap-free notification log
//! - [`ProcessRecorder`]: adds tracking of processed upstream notifications
//!
//! The in-memory recorders in [`memory`] satisfy the full contract and back
//! tests and development; database-backed recorders live in driver crates.

pub mod cipher;
pub mod compressor;
pub mod error;
pub mod item;
pub mod mapper;
pub mod memory;
pub mod recorder;
pub mod store;
pub mod transcoder;

pub use cipher::{AesGcmCipher, Cipher, CipherError};
pub use compressor::{Compressor, CompressorError, ZlibCompressor};
pub use error::PersistenceError;
pub use item::{Notification, NotificationId, StoredItem, Tracking};
pub use mapper::Mapper;
pub use memory::{InMemoryAggregateRecorder, InMemoryApplicationRecorder, InMemoryProcessRecorder};
pub use recorder::{AggregateRecorder, ApplicationRecorder, EventSelect, ProcessRecorder};
pub use store::{EventIter, EventStore};
pub use transcoder::{JsonTranscoder, TopicRegistry, Transcoder, TranscoderError};
