//! volchunk - block-chunked storage for 3D medical volumes
//!
//! Converts dense 16-bit volumes (typically NIfTI-1 images and label maps)
//! into a container of independently compressed cubic blocks, and back.
//!
//! # Features
//!
//! - Fixed-edge block partitioning with clamped boundary blocks
//! - Per-block compression (Deflate, Zstd or stored)
//! - Sparse storage: blocks holding only the fill value are not written
//! - Whole-volume layout for compatibility with unchunked containers
//! - Affine and full header round trip through container attributes
//! - Async batch conversion of `img/` and `label/` directories
//!
//! # Example
//!
//! ```rust,ignore
//! use volchunk::{CodecConfig, VolumeDecoder, VolumeEncoder, VolumeGrid};
//!
//! # fn example() -> volchunk::Result<()> {
//! let grid = VolumeGrid::filled([130, 130, 130], 0)?;
//! let encoder = VolumeEncoder::new(CodecConfig::default())?;
//! let container = encoder.encode(&grid, &Default::default(), &Default::default())?;
//!
//! let decoded = VolumeDecoder::default().decode(&container)?;
//! assert_eq!(decoded.grid, grid);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod codec;
pub mod compression;
pub mod config;
pub mod container;
pub mod error;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod nifti;
pub mod pipeline;
pub mod reader;
pub mod types;
pub mod utils;
pub mod volume;
pub mod writer;

// Re-exports
pub use batch::{BatchConfig, BatchReport, Direction};
pub use codec::BlockCodec;
pub use compression::{CompressionLevel, CompressionMethod, Compressor};
pub use config::{CodecConfig, ContainerMode};
pub use container::Container;
pub use error::{Result, VolchunkError};
pub use io::{FileSystemIOManager, IOManager, RetryPolicy};
pub use layout::{BlockExtent, BlockPartitioner};
pub use metadata::ContainerSummary;
pub use nifti::{Nifti1Codec, VolumeFileCodec};
pub use pipeline::{SourceVolume, VolumeDecoder, VolumeEncoder};
pub use reader::{ContainerReader, ContainerVariant, DecodedVolume};
pub use types::{AffineTransform, BlockCoord, HeaderAttributes, HeaderValue, Shape};
pub use volume::VolumeGrid;
pub use writer::ContainerWriter;

/// Version of the volchunk implementation
pub const VOLCHUNK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic number for container files
pub const CONTAINER_MAGIC: &[u8; 4] = b"VCK\0";
