//! Container writer - serializes a volume into chunked or whole-volume form

use crate::codec::BlockCodec;
use crate::config::{CodecConfig, ContainerMode};
use crate::container::{Container, Dataset};
use crate::error::Result;
use crate::layout::BlockPartitioner;
use crate::metadata::{
    AFFINE_KEY, BLOCK_EDGE_ATTR, COMPRESSED_LEN_ATTR, COMPRESSION_ATTR, FILL_VALUE_ATTR,
    HEADER_GROUP, WHOLE_VOLUME_DATASET,
};
use crate::types::{AffineTransform, BlockCoord, HeaderAttributes, HeaderValue};
use crate::volume::VolumeGrid;
use rayon::prelude::*;
use tracing::debug;

/// Builds a [`Container`] from a volume and its metadata
#[derive(Debug)]
pub struct ContainerWriter {
    config: CodecConfig,
    partitioner: BlockPartitioner,
    codec: BlockCodec,
}

impl ContainerWriter {
    pub fn new(config: CodecConfig) -> Result<Self> {
        Ok(Self {
            partitioner: config.partitioner()?,
            codec: BlockCodec::new(config.compression, config.level),
            config,
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Serialize the volume in the configured mode
    pub fn write(
        &self,
        grid: &VolumeGrid,
        affine: &AffineTransform,
        header: &HeaderAttributes,
    ) -> Result<Container> {
        let mut container = Container::new();
        container.set_attr(AFFINE_KEY, HeaderValue::FloatVector(affine.to_row_major()));
        container.set_attr(
            COMPRESSION_ATTR,
            HeaderValue::Text(self.codec.method().as_str().to_string()),
        );
        container.add_group(HEADER_GROUP, header.clone())?;

        match self.config.mode {
            ContainerMode::Chunked => self.write_blocks(grid, &mut container)?,
            ContainerMode::WholeVolume => self.write_whole(grid, &mut container)?,
        }

        Ok(container)
    }

    /// One dataset per non-fill block, in raster order
    fn write_blocks(&self, grid: &VolumeGrid, container: &mut Container) -> Result<()> {
        let shape = grid.shape();
        let fill = self.config.fill_value;
        container.set_attr(
            BLOCK_EDGE_ATTR,
            HeaderValue::Int(self.partitioner.block_edge() as i64),
        );
        container.set_attr(FILL_VALUE_ATTR, HeaderValue::Int(fill as i64));

        let coords: Vec<BlockCoord> = self.partitioner.blocks(shape).collect();
        let payloads = coords
            .par_iter()
            .map(|&coord| -> Result<Option<(BlockCoord, Vec<u8>)>> {
                let extent = self.partitioner.block_extent(shape, coord);
                if grid.block_is_fill(&extent, fill) {
                    return Ok(None);
                }
                let payload = self.codec.compress(&grid.extract_block(&extent))?;
                Ok(Some((coord, payload)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut stored = 0usize;
        for (coord, payload) in payloads.into_iter().flatten() {
            debug!(block = %coord, bytes = payload.len(), "block compressed");
            let len = payload.len() as i64;
            container.add_dataset(
                Dataset::new(coord.key(), payload)
                    .with_attr(COMPRESSED_LEN_ATTR, HeaderValue::Int(len)),
            )?;
            stored += 1;
        }

        debug!(
            stored,
            omitted = coords.len() - stored,
            "{}",
            self.partitioner.summary(shape)
        );
        Ok(())
    }

    /// A single dataset compressed in one pass; no partitioning
    fn write_whole(&self, grid: &VolumeGrid, container: &mut Container) -> Result<()> {
        let payload = self.codec.compress(&grid.to_vec())?;
        let len = payload.len() as i64;
        container.add_dataset(
            Dataset::new(WHOLE_VOLUME_DATASET, payload)
                .with_attr(COMPRESSED_LEN_ATTR, HeaderValue::Int(len)),
        )?;
        Ok(())
    }
}
