//! Per-block sample codec
//!
//! Samples are serialized little-endian and passed through one lossless
//! compressor. Payloads are stored at their exact compressed length; nothing
//! is padded or truncated in either direction.

use crate::compression::{get_compressor, CompressionLevel, CompressionMethod, Compressor};
use crate::error::{Result, VolchunkError};
use crate::utils::{bytes_to_samples, samples_to_bytes, SAMPLE_WIDTH};

/// Compresses and decompresses one block (or one whole volume) of samples
pub struct BlockCodec {
    compressor: Box<dyn Compressor>,
    level: CompressionLevel,
}

impl BlockCodec {
    pub fn new(method: CompressionMethod, level: CompressionLevel) -> Self {
        Self {
            compressor: get_compressor(method),
            level,
        }
    }

    pub fn method(&self) -> CompressionMethod {
        self.compressor.method()
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Serialize and compress a sample sequence
    pub fn compress(&self, samples: &[i16]) -> Result<Vec<u8>> {
        let raw = samples_to_bytes(samples);
        self.compressor.compress(&raw, self.level)
    }

    /// Decompress a payload that must hold exactly `expected_sample_count` samples
    pub fn decompress(&self, payload: &[u8], expected_sample_count: usize) -> Result<Vec<i16>> {
        let expected_bytes = expected_sample_count
            .checked_mul(SAMPLE_WIDTH)
            .ok_or_else(|| {
                VolchunkError::InvalidShape(format!(
                    "{} samples exceed the addressable size",
                    expected_sample_count
                ))
            })?;
        let raw = self.compressor.decompress(payload, Some(expected_bytes))?;

        if raw.len() % SAMPLE_WIDTH != 0 {
            return Err(VolchunkError::CorruptBlock(format!(
                "decompressed length {} is not a multiple of the sample width",
                raw.len()
            )));
        }
        if raw.len() != expected_bytes {
            return Err(VolchunkError::CorruptBlock(format!(
                "expected {} samples, payload holds {}{}",
                expected_sample_count,
                raw.len() / SAMPLE_WIDTH,
                if raw.len() > expected_bytes { " or more" } else { "" }
            )));
        }

        bytes_to_samples(&raw)
    }
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new(CompressionMethod::default(), CompressionLevel::best())
    }
}

impl std::fmt::Debug for BlockCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCodec")
            .field("method", &self.method())
            .field("level", &self.level)
            .finish()
    }
}
