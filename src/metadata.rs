//! Container metadata: reserved keys, shape derivation and summaries

use crate::container::Container;
use crate::error::{Result, VolchunkError};
use crate::reader::{detect_variant, ContainerVariant};
use crate::types::{BlockCoord, HeaderAttributes, HeaderValue, Shape};
use crate::utils::{format_bytes, SAMPLE_WIDTH};
use serde::Serialize;

/// Root attribute holding the row-major affine
pub const AFFINE_KEY: &str = "affine_matrix";

/// Group mirroring the scan header
pub const HEADER_GROUP: &str = "header";

/// Dataset holding the whole volume in whole-volume mode
pub const WHOLE_VOLUME_DATASET: &str = "nii_data";

/// Header attribute describing the volume dimensions
pub const DIM_KEY: &str = "dim";

/// Root attribute: block edge length (chunked mode marker)
pub const BLOCK_EDGE_ATTR: &str = "block_edge";

/// Root attribute: fill value of omitted blocks
pub const FILL_VALUE_ATTR: &str = "fill_value";

/// Root attribute: compression method name
pub const COMPRESSION_ATTR: &str = "compression";

/// Dataset attribute: exact stored payload length
pub const COMPRESSED_LEN_ATTR: &str = "compressed_len";

/// Largest axis length a NIfTI-1 `dim` slot can hold
pub const MAX_AXIS_LEN: usize = i16::MAX as usize;

/// Number of voxels in `shape`, or `InvalidShape` if it overflows
pub fn voxel_count(shape: Shape) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| VolchunkError::InvalidShape(format!("{:?} voxel count overflows", shape)))
}

/// Stored byte size of `shape` as `i16` samples
pub fn sample_bytes(shape: Shape) -> Result<usize> {
    voxel_count(shape)?
        .checked_mul(SAMPLE_WIDTH)
        .ok_or_else(|| VolchunkError::InvalidShape(format!("{:?} byte size overflows", shape)))
}

/// Derive the (X, Y, Z) shape from the header's `dim` attribute.
///
/// `dim[0]` is the number of dimensions; axes past the third must be 1.
pub fn shape_from_header(header: &HeaderAttributes) -> Result<Shape> {
    let value = header
        .get(DIM_KEY)
        .ok_or_else(|| VolchunkError::MissingMetadata(format!("header/{}", DIM_KEY)))?;
    let dim = value.as_int_vector().ok_or_else(|| {
        VolchunkError::InvalidShape(format!("header/{} is not an integer vector", DIM_KEY))
    })?;

    let ndim = *dim
        .first()
        .ok_or_else(|| VolchunkError::InvalidShape(format!("header/{} is empty", DIM_KEY)))?;
    if ndim < 1 || ndim as usize >= dim.len() {
        return Err(VolchunkError::InvalidShape(format!(
            "header/{} declares {} dimensions in {:?}",
            DIM_KEY, ndim, dim
        )));
    }

    let axes = &dim[1..=ndim as usize];
    if let Some(&bad) = axes.iter().find(|&&d| d <= 0) {
        return Err(VolchunkError::InvalidShape(format!(
            "non-positive dimension {} in {:?}",
            bad, dim
        )));
    }
    if let Some(&big) = axes.iter().find(|&&d| d as u64 > MAX_AXIS_LEN as u64) {
        return Err(VolchunkError::InvalidShape(format!(
            "dimension {} exceeds {} in {:?}",
            big, MAX_AXIS_LEN, dim
        )));
    }
    if axes.iter().skip(3).any(|&d| d != 1) {
        return Err(VolchunkError::InvalidShape(format!(
            "only 3D volumes are supported, got {:?}",
            axes
        )));
    }

    let mut shape = [1usize; 3];
    for (slot, &d) in shape.iter_mut().zip(axes) {
        *slot = d as usize;
    }
    sample_bytes(shape)?;
    Ok(shape)
}

/// Record `shape` in the header's `dim` attribute (NIfTI 8-slot layout)
pub fn set_dim(header: &mut HeaderAttributes, shape: Shape) {
    let mut dim = vec![3i64, 1, 1, 1, 1, 1, 1, 1];
    for (slot, &d) in dim[1..4].iter_mut().zip(shape.iter()) {
        *slot = d as i64;
    }
    header.insert(DIM_KEY, HeaderValue::IntVector(dim));
}

/// Overview of a container, for inspection and reporting
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub variant: String,
    pub shape: Option<Shape>,
    pub block_edge: Option<usize>,
    pub compression: Option<String>,
    pub blocks_stored: usize,
    pub blocks_total: Option<usize>,
    pub payload_bytes: usize,
    pub uncompressed_bytes: Option<usize>,
    pub header_attributes: usize,
}

impl ContainerSummary {
    pub fn from_container(container: &Container) -> Result<Self> {
        let variant = detect_variant(container)?;
        let header = container.group(HEADER_GROUP).map(|g| &g.attrs);
        let shape = header.and_then(|h| shape_from_header(h).ok());
        let block_edge = container
            .attr(BLOCK_EDGE_ATTR)
            .and_then(HeaderValue::as_int)
            .filter(|&e| e > 0)
            .map(|e| e as usize);

        let blocks_stored = container
            .datasets()
            .iter()
            .filter(|d| BlockCoord::parse_key(&d.name).is_some())
            .count();
        let blocks_total = match (shape, block_edge) {
            (Some(shape), Some(edge)) => {
                Some(shape.iter().map(|d| d.div_ceil(edge)).product())
            }
            _ => None,
        };

        Ok(Self {
            variant: match variant {
                ContainerVariant::Chunked => "chunked".to_string(),
                ContainerVariant::WholeVolume => "whole".to_string(),
            },
            shape,
            block_edge,
            compression: container
                .attr(COMPRESSION_ATTR)
                .and_then(HeaderValue::as_text)
                .map(str::to_string),
            blocks_stored,
            blocks_total,
            payload_bytes: container.payload_bytes(),
            uncompressed_bytes: shape.and_then(|s| sample_bytes(s).ok()),
            header_attributes: header.map(|h| h.len()).unwrap_or(0),
        })
    }

    pub fn compression_ratio(&self) -> f64 {
        match self.uncompressed_bytes {
            Some(raw) if self.payload_bytes > 0 => raw as f64 / self.payload_bytes as f64,
            _ => 0.0,
        }
    }

    pub fn summary(&self) -> String {
        let shape = self
            .shape
            .map(|s| format!("{} x {} x {}", s[0], s[1], s[2]))
            .unwrap_or_else(|| "unknown shape".to_string());
        format!(
            "{} container: {}, {} stored blocks, {} payload ({:.2}x)",
            self.variant,
            shape,
            self.blocks_stored,
            format_bytes(self.payload_bytes),
            self.compression_ratio()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_dim(dim: Vec<i64>) -> HeaderAttributes {
        HeaderAttributes::new().with(DIM_KEY, HeaderValue::IntVector(dim))
    }

    #[test]
    fn test_shape_from_nifti_dim() {
        let header = header_with_dim(vec![3, 130, 120, 90, 1, 1, 1, 1]);
        assert_eq!(shape_from_header(&header).unwrap(), [130, 120, 90]);
    }

    #[test]
    fn test_shape_pads_low_dimensional() {
        let header = header_with_dim(vec![2, 10, 20, 0, 0, 0, 0, 0]);
        assert_eq!(shape_from_header(&header).unwrap(), [10, 20, 1]);
    }

    #[test]
    fn test_shape_accepts_singleton_time_axis() {
        let header = header_with_dim(vec![4, 10, 20, 30, 1, 1, 1, 1]);
        assert_eq!(shape_from_header(&header).unwrap(), [10, 20, 30]);
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            shape_from_header(&HeaderAttributes::new()),
            Err(VolchunkError::MissingMetadata(_))
        ));
        assert!(matches!(
            shape_from_header(&header_with_dim(vec![3, 10, 0, 4, 1, 1, 1, 1])),
            Err(VolchunkError::InvalidShape(_))
        ));
        assert!(matches!(
            shape_from_header(&header_with_dim(vec![4, 10, 10, 4, 5, 1, 1, 1])),
            Err(VolchunkError::InvalidShape(_))
        ));
        assert!(matches!(
            shape_from_header(&header_with_dim(vec![9, 1, 1])),
            Err(VolchunkError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_oversized_dim_rejected() {
        assert!(matches!(
            shape_from_header(&header_with_dim(vec![3, 1 << 62, 4, 1, 1, 1, 1, 1])),
            Err(VolchunkError::InvalidShape(_))
        ));
        assert!(matches!(
            shape_from_header(&header_with_dim(vec![3, 32768, 1, 1, 1, 1, 1, 1])),
            Err(VolchunkError::InvalidShape(_))
        ));
        assert_eq!(
            shape_from_header(&header_with_dim(vec![3, 32767, 2, 1, 1, 1, 1, 1])).unwrap(),
            [32767, 2, 1]
        );
    }

    #[test]
    fn test_checked_counts() {
        assert_eq!(voxel_count([130, 130, 130]).unwrap(), 2_197_000);
        assert_eq!(sample_bytes([65, 1, 1]).unwrap(), 130);
        assert!(matches!(
            voxel_count([usize::MAX, 2, 1]),
            Err(VolchunkError::InvalidShape(_))
        ));
        assert!(sample_bytes([usize::MAX, 1, 1]).is_err());
    }

    #[test]
    fn test_set_dim() {
        let mut header = HeaderAttributes::new();
        set_dim(&mut header, [65, 1, 1]);
        assert_eq!(
            header.get(DIM_KEY),
            Some(&HeaderValue::IntVector(vec![3, 65, 1, 1, 1, 1, 1, 1]))
        );
        assert_eq!(shape_from_header(&header).unwrap(), [65, 1, 1]);
    }
}
