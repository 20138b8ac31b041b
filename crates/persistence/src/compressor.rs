//! Optional compression of stored event state.

use std::io::Write;

use flate2::Compression;
use flate2::write::{ZlibDecoder, ZlibEncoder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompressorError {
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),
}

/// Byte-level compression applied between serialization and encryption.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressorError>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressorError>;
}

/// Zlib compressor (flate2).
#[derive(Debug, Clone)]
pub struct ZlibCompressor {
    level: u32,
}

impl ZlibCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compression level 0-9; values above 9 are clamped.
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor for ZlibCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressorError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data).map_err(CompressorError::Compress)?;
        encoder.finish().map_err(CompressorError::Compress)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressorError> {
        let mut decoder = ZlibDecoder::new(Vec::new());
        decoder
            .write_all(data)
            .map_err(CompressorError::Decompress)?;
        decoder.finish().map_err(CompressorError::Decompress)
    }
}
