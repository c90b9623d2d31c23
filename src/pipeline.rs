//! End-to-end encode/decode entry points

use crate::config::CodecConfig;
use crate::container::Container;
use crate::error::{Result, VolchunkError};
use crate::metadata::{set_dim, shape_from_header, DIM_KEY};
use crate::reader::{ContainerReader, DecodedVolume};
use crate::types::{AffineTransform, HeaderAttributes, Shape};
use crate::volume::{CastReport, SampleCast, VolumeGrid};
use crate::writer::ContainerWriter;
use tracing::info;

/// A volume as read from a source file, before narrowing to `i16`
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVolume {
    pub shape: Shape,
    /// Samples in row-major (z fastest) order
    pub samples: Vec<f64>,
    pub affine: AffineTransform,
    pub header: HeaderAttributes,
}

/// Turns a volume plus metadata into a container
#[derive(Debug)]
pub struct VolumeEncoder {
    writer: ContainerWriter,
}

impl VolumeEncoder {
    pub fn new(config: CodecConfig) -> Result<Self> {
        Ok(Self {
            writer: ContainerWriter::new(config)?,
        })
    }

    /// Encode an `i16` grid.
    ///
    /// A header without `dim` gets one from the grid; a header whose `dim`
    /// disagrees with the grid is rejected.
    pub fn encode(
        &self,
        grid: &VolumeGrid,
        affine: &AffineTransform,
        header: &HeaderAttributes,
    ) -> Result<Container> {
        let mut header = header.clone();
        if !header.contains_key(DIM_KEY) {
            set_dim(&mut header, grid.shape());
        }
        let recorded = shape_from_header(&header)?;
        if recorded != grid.shape() {
            return Err(VolchunkError::InvalidShape(format!(
                "header dim {:?} does not match grid shape {:?}",
                recorded,
                grid.shape()
            )));
        }

        let container = self.writer.write(grid, affine, &header)?;
        info!(
            shape = ?grid.shape(),
            mode = %self.writer.config().mode,
            datasets = container.datasets().len(),
            bytes = container.payload_bytes(),
            "volume encoded"
        );
        Ok(container)
    }

    /// Narrow a wider source volume to `i16` and encode it
    pub fn encode_source(&self, source: &SourceVolume) -> Result<(Container, CastReport)> {
        let (grid, report) = SampleCast::grid_from_f64(source.shape, &source.samples)?;
        let container = self.encode(&grid, &source.affine, &source.header)?;
        Ok((container, report))
    }
}

/// Turns a container back into a volume plus metadata
#[derive(Debug, Clone, Default)]
pub struct VolumeDecoder {
    reader: ContainerReader,
}

impl VolumeDecoder {
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            reader: ContainerReader::new(config),
        })
    }

    pub fn decode(&self, container: &Container) -> Result<DecodedVolume> {
        let decoded = self.reader.read(container)?;
        info!(shape = ?decoded.grid.shape(), "volume decoded");
        Ok(decoded)
    }
}
