//! Lossless byte compressors used for block and whole-volume payloads

use crate::error::{Result, VolchunkError};
use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::str::FromStr;

/// Compression methods a container may be written with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    /// No compression
    None = 0,
    /// Deflate/ZIP compression
    Deflate = 1,
    /// Zstandard compression
    Zstd = 3,
}

impl CompressionMethod {
    /// Get the method from a byte value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Deflate),
            3 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }

    /// Name recorded in the container's `compression` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Zstd => "zstd",
        }
    }
}

impl Default for CompressionMethod {
    fn default() -> Self {
        CompressionMethod::Deflate
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionMethod {
    type Err = VolchunkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionMethod::None),
            "deflate" | "gzip" | "zip" => Ok(CompressionMethod::Deflate),
            "zstd" => Ok(CompressionMethod::Zstd),
            other => Err(VolchunkError::Configuration(format!(
                "Unknown compression method: {}",
                other
            ))),
        }
    }
}

/// Compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

/// Trait for compression/decompression operations
pub trait Compressor: Send + Sync {
    /// Compress data
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>>;

    /// Decompress data.
    ///
    /// With `expected_size` set, output is capped at one byte past it so that
    /// an oversized stream is detectable without inflating all of it.
    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>>;

    /// Get the compression method
    fn method(&self) -> CompressionMethod;
}

/// Upper bound on buffer space reserved before any output is produced
const MAX_PREALLOC: usize = 16 << 20;

fn read_capped<R: Read>(reader: R, expected_size: Option<usize>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size.unwrap_or(0).min(MAX_PREALLOC));
    let result = match expected_size {
        Some(size) => reader.take((size as u64).saturating_add(1)).read_to_end(&mut out),
        None => {
            let mut reader = reader;
            reader.read_to_end(&mut out)
        }
    };
    result.map_err(|e| VolchunkError::CompressionBackend(e.to_string()))?;
    Ok(out)
}

/// No compression
#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], _expected_size: Option<usize>) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

/// Deflate compression
#[derive(Debug, Default)]
pub struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(data, FlateCompression::new(level.value() as u32));
        let mut compressed = Vec::new();
        encoder
            .read_to_end(&mut compressed)
            .map_err(|e| VolchunkError::CompressionBackend(e.to_string()))?;
        Ok(compressed)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        read_capped(DeflateDecoder::new(data), expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

/// Zstandard compression
#[derive(Debug, Default)]
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::encode_all(data, level.value() as i32)
            .map_err(|e| VolchunkError::CompressionBackend(e.to_string()))
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| VolchunkError::CompressionBackend(e.to_string()))?;
        read_capped(decoder, expected_size)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// Get a compressor for a given method
pub fn get_compressor(method: CompressionMethod) -> Box<dyn Compressor> {
    match method {
        CompressionMethod::None => Box::new(NoneCompressor),
        CompressionMethod::Deflate => Box::new(DeflateCompressor),
        CompressionMethod::Zstd => Box::new(ZstdCompressor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_compression() {
        let compressor = NoneCompressor;
        let data = b"Hello, world!";
        let compressed = compressor
            .compress(data, CompressionLevel::default())
            .unwrap();
        assert_eq!(compressed, data);
        let decompressed = compressor.decompress(&compressed, None).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_deflate() {
        let compressor = DeflateCompressor;
        let data = vec![0u8, 1, 0, 2].repeat(500);
        let compressed = compressor.compress(&data, CompressionLevel::best()).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = compressor
            .decompress(&compressed, Some(data.len()))
            .unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_zstd() {
        let compressor = ZstdCompressor;
        let data = vec![7u8; 4096];
        let compressed = compressor
            .compress(&data, CompressionLevel::default())
            .unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = compressor.decompress(&compressed, None).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_decompress_is_capped() {
        let compressor = DeflateCompressor;
        let data = vec![1u8; 1000];
        let compressed = compressor.compress(&data, CompressionLevel::fast()).unwrap();
        let capped = compressor.decompress(&compressed, Some(10)).unwrap();
        assert_eq!(capped.len(), 11);
    }

    #[test]
    fn test_garbage_is_backend_error() {
        let result = ZstdCompressor.decompress(b"definitely not zstd", None);
        assert!(matches!(result, Err(VolchunkError::CompressionBackend(_))));
    }

    #[test]
    fn test_method_names() {
        for method in [
            CompressionMethod::None,
            CompressionMethod::Deflate,
            CompressionMethod::Zstd,
        ] {
            assert_eq!(method.as_str().parse::<CompressionMethod>().unwrap(), method);
            assert_eq!(CompressionMethod::from_u8(method as u8), Some(method));
        }
        assert_eq!("gzip".parse::<CompressionMethod>().unwrap(), CompressionMethod::Deflate);
        assert!("lz77".parse::<CompressionMethod>().is_err());
    }
}
