//! Codec configuration

use crate::compression::{CompressionLevel, CompressionMethod};
use crate::error::{Result, VolchunkError};
use crate::layout::{BlockPartitioner, DEFAULT_BLOCK_EDGE};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serialization mode of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerMode {
    /// One independently compressed dataset per non-fill block
    #[default]
    Chunked,
    /// One dataset holding the whole volume, compressed in a single pass
    WholeVolume,
}

impl fmt::Display for ContainerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerMode::Chunked => f.write_str("chunked"),
            ContainerMode::WholeVolume => f.write_str("whole"),
        }
    }
}

impl FromStr for ContainerMode {
    type Err = VolchunkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chunked" => Ok(ContainerMode::Chunked),
            "whole" | "whole_volume" => Ok(ContainerMode::WholeVolume),
            other => Err(VolchunkError::Configuration(format!(
                "Unknown container mode: {}",
                other
            ))),
        }
    }
}

/// Settings shared by the encoder and decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Block edge length in voxels
    pub block_edge: usize,

    /// Sample value of empty voxels; all-fill blocks are not stored
    pub fill_value: i16,

    /// Compressor for block and whole-volume payloads
    pub compression: CompressionMethod,

    /// Compressor level
    pub level: CompressionLevel,

    /// Container mode used by the encoder
    pub mode: ContainerMode,
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_edge(mut self, block_edge: usize) -> Self {
        self.block_edge = block_edge;
        self
    }

    pub fn with_fill_value(mut self, fill_value: i16) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_mode(mut self, mode: ContainerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check the settings and build the matching partitioner
    pub fn partitioner(&self) -> Result<BlockPartitioner> {
        BlockPartitioner::new(self.block_edge)
    }

    pub fn validate(&self) -> Result<()> {
        self.partitioner().map(|_| ())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            block_edge: DEFAULT_BLOCK_EDGE,
            fill_value: 0,
            compression: CompressionMethod::Deflate,
            level: CompressionLevel::best(),
            mode: ContainerMode::Chunked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.block_edge, 64);
        assert_eq!(config.fill_value, 0);
        assert_eq!(config.compression, CompressionMethod::Deflate);
        assert_eq!(config.level.value(), 9);
        assert_eq!(config.mode, ContainerMode::Chunked);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_edge_invalid() {
        let config = CodecConfig::new().with_block_edge(0);
        assert!(matches!(
            config.validate(),
            Err(VolchunkError::Configuration(_))
        ));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("chunked".parse::<ContainerMode>().unwrap(), ContainerMode::Chunked);
        assert_eq!("whole".parse::<ContainerMode>().unwrap(), ContainerMode::WholeVolume);
        assert!("tiled".parse::<ContainerMode>().is_err());
    }

    #[test]
    fn test_config_serializes() {
        let config = CodecConfig::new()
            .with_block_edge(32)
            .with_compression(CompressionMethod::Zstd);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"zstd\""));
        let back: CodecConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
