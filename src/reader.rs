//! Container reader - variant detection and volume reconstruction

use crate::codec::BlockCodec;
use crate::compression::CompressionMethod;
use crate::config::CodecConfig;
use crate::container::{Container, Dataset};
use crate::error::{Result, VolchunkError};
use crate::layout::{BlockExtent, BlockPartitioner};
use crate::metadata::{
    shape_from_header, voxel_count, AFFINE_KEY, BLOCK_EDGE_ATTR, COMPRESSED_LEN_ATTR,
    COMPRESSION_ATTR, FILL_VALUE_ATTR, HEADER_GROUP, WHOLE_VOLUME_DATASET,
};
use crate::types::{AffineTransform, BlockCoord, HeaderAttributes, HeaderValue, Shape};
use crate::volume::VolumeGrid;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Which serialization mode a container was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVariant {
    WholeVolume,
    Chunked,
}

/// Identify the container variant from its top-level key set
pub fn detect_variant(container: &Container) -> Result<ContainerVariant> {
    let has_whole = container.has_dataset(WHOLE_VOLUME_DATASET);
    let has_blocks = container
        .datasets()
        .iter()
        .any(|d| d.name.starts_with(BlockCoord::KEY_PREFIX));
    let has_edge = container.attr(BLOCK_EDGE_ATTR).is_some();

    match (has_whole, has_blocks || has_edge) {
        (true, false) => Ok(ContainerVariant::WholeVolume),
        (false, true) => Ok(ContainerVariant::Chunked),
        (true, true) => Err(VolchunkError::UnsupportedContainerVariant(
            "both whole-volume and block markers present".to_string(),
        )),
        (false, false) => Err(VolchunkError::UnsupportedContainerVariant(
            "neither whole-volume nor block markers present".to_string(),
        )),
    }
}

/// A reconstructed volume with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVolume {
    pub grid: VolumeGrid,
    pub affine: AffineTransform,
    pub header: HeaderAttributes,
}

/// Rebuilds volumes from containers.
///
/// Attributes recorded in the container (block edge, fill value, compression)
/// take precedence; the configuration only fills in what a container omits.
#[derive(Debug, Clone)]
pub struct ContainerReader {
    config: CodecConfig,
}

impl ContainerReader {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn read(&self, container: &Container) -> Result<DecodedVolume> {
        let variant = detect_variant(container)?;

        let header = container
            .group(HEADER_GROUP)
            .map(|g| g.attrs.clone())
            .ok_or_else(|| VolchunkError::MissingMetadata(format!("{} group", HEADER_GROUP)))?;
        let shape = shape_from_header(&header)?;
        let affine = read_affine(container)?;
        let codec = BlockCodec::new(self.compression(container)?, self.config.level);

        let grid = match variant {
            ContainerVariant::WholeVolume => self.read_whole(container, shape, &codec)?,
            ContainerVariant::Chunked => self.read_blocks(container, shape, &codec)?,
        };

        Ok(DecodedVolume {
            grid,
            affine,
            header,
        })
    }

    fn compression(&self, container: &Container) -> Result<CompressionMethod> {
        match container.attr(COMPRESSION_ATTR) {
            Some(HeaderValue::Text(name)) => name.parse(),
            Some(other) => Err(VolchunkError::InvalidFormat(format!(
                "{} attribute has unexpected value {}",
                COMPRESSION_ATTR, other
            ))),
            None => Ok(self.config.compression),
        }
    }

    fn read_whole(
        &self,
        container: &Container,
        shape: Shape,
        codec: &BlockCodec,
    ) -> Result<VolumeGrid> {
        let dataset = container
            .dataset(WHOLE_VOLUME_DATASET)
            .ok_or_else(|| VolchunkError::NotFound(WHOLE_VOLUME_DATASET.to_string()))?;
        check_stored_length(dataset)?;

        let samples = codec.decompress(&dataset.data, voxel_count(shape)?)?;
        VolumeGrid::new(shape, samples)
    }

    fn read_blocks(
        &self,
        container: &Container,
        shape: Shape,
        codec: &BlockCodec,
    ) -> Result<VolumeGrid> {
        let block_edge = match container.attr(BLOCK_EDGE_ATTR) {
            Some(value) => positive_int(value, BLOCK_EDGE_ATTR)?,
            None => self.config.block_edge,
        };
        let fill = match container.attr(FILL_VALUE_ATTR) {
            Some(value) => value
                .as_int()
                .and_then(|v| i16::try_from(v).ok())
                .ok_or_else(|| {
                    VolchunkError::InvalidFormat(format!(
                        "bad {} attribute {}",
                        FILL_VALUE_ATTR, value
                    ))
                })?,
            None => self.config.fill_value,
        };
        let partitioner = BlockPartitioner::new(block_edge)?;

        let mut seen = HashSet::new();
        let mut blocks: Vec<(BlockExtent, &Dataset)> = Vec::new();
        for dataset in container.datasets() {
            let Some(parsed) = BlockCoord::parse_key(&dataset.name) else {
                debug!(key = %dataset.name, "ignoring non-block dataset");
                continue;
            };
            let coord = parsed?;
            if !partitioner.contains_block(shape, coord) {
                return Err(VolchunkError::CorruptBlock(format!(
                    "block {} lies outside the {:?} block grid",
                    coord,
                    partitioner.grid_dims(shape)
                )));
            }
            if !seen.insert(coord) {
                return Err(VolchunkError::CorruptBlock(format!(
                    "block {} stored more than once",
                    coord
                )));
            }
            blocks.push((partitioner.block_extent(shape, coord), dataset));
        }

        let decoded = blocks
            .par_iter()
            .map(|(extent, dataset)| -> Result<Vec<i16>> {
                check_stored_length(dataset)?;
                codec
                    .decompress(&dataset.data, extent.voxel_count())
                    .map_err(|e| match e {
                        VolchunkError::CorruptBlock(msg) => {
                            VolchunkError::CorruptBlock(format!("{}: {}", dataset.name, msg))
                        }
                        other => other,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        // Extents are disjoint, so placement order does not matter.
        let mut grid = VolumeGrid::filled(shape, fill)?;
        for ((extent, _), samples) in blocks.iter().zip(&decoded) {
            grid.place_block(extent, samples)?;
        }

        debug!(
            stored = blocks.len(),
            filled = partitioner.total_blocks(shape) - blocks.len(),
            "{}",
            partitioner.summary(shape)
        );
        Ok(grid)
    }
}

impl Default for ContainerReader {
    fn default() -> Self {
        Self::new(CodecConfig::default())
    }
}

fn read_affine(container: &Container) -> Result<AffineTransform> {
    let value = container
        .attr(AFFINE_KEY)
        .ok_or_else(|| VolchunkError::MissingMetadata(AFFINE_KEY.to_string()))?;
    let values = value.as_float_vector().ok_or_else(|| {
        VolchunkError::InvalidFormat(format!("{} is not a numeric vector", AFFINE_KEY))
    })?;
    AffineTransform::from_row_major(&values)
}

fn positive_int(value: &HeaderValue, key: &str) -> Result<usize> {
    value
        .as_int()
        .filter(|&v| v > 0)
        .map(|v| v as usize)
        .ok_or_else(|| VolchunkError::InvalidFormat(format!("bad {} attribute {}", key, value)))
}

/// The stored payload must be exactly as long as the writer recorded
fn check_stored_length(dataset: &Dataset) -> Result<()> {
    match dataset.attrs.get(COMPRESSED_LEN_ATTR) {
        None => Ok(()),
        Some(HeaderValue::Int(len)) if *len == dataset.data.len() as i64 => Ok(()),
        Some(other) => Err(VolchunkError::CorruptBlock(format!(
            "{}: stored {} bytes, recorded length {}",
            dataset.name,
            dataset.data.len(),
            other
        ))),
    }
}
