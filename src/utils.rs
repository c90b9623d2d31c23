//! Utility functions

use crate::error::{Result, VolchunkError};
use byteorder::{ByteOrder, LittleEndian};

/// Width of one stored sample in bytes
pub const SAMPLE_WIDTH: usize = std::mem::size_of::<i16>();

/// Serialize samples to little-endian bytes
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * SAMPLE_WIDTH];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

/// Deserialize little-endian bytes to samples
pub fn bytes_to_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % SAMPLE_WIDTH != 0 {
        return Err(VolchunkError::CorruptBlock(format!(
            "{} bytes is not a whole number of {}-byte samples",
            bytes.len(),
            SAMPLE_WIDTH
        )));
    }

    let mut samples = vec![0i16; bytes.len() / SAMPLE_WIDTH];
    LittleEndian::read_i16_into(bytes, &mut samples);
    Ok(samples)
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
