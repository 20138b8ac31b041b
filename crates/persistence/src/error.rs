//! Persistence error model.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::compressor::CompressorError;
use crate::transcoder::TranscoderError;

/// Failure of a persistence operation.
///
/// `Integrity` is a first-class, retriable outcome: an optimistic concurrency
/// collision on `(originator_id, originator_version)` or a duplicate tracking
/// row. Callers may reload and retry. `Datastore` is an unrecoverable driver
/// or I/O failure; the failed write has no visible effect, and any ambiguous
/// driver state is surfaced here rather than swallowed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A unique-constraint violation in the recorder.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// An unrecoverable I/O or driver failure.
    #[error("datastore failure: {0}")]
    Datastore(String),

    #[error(transparent)]
    Transcoder(#[from] TranscoderError),

    #[error(transparent)]
    Compressor(#[from] CompressorError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl PersistenceError {
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn datastore(msg: impl Into<String>) -> Self {
        Self::Datastore(msg.into())
    }

    /// True for optimistic-concurrency and tracking collisions.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}
