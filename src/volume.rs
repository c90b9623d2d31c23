//! Dense 3D sample grid

use crate::error::{Result, VolchunkError};
use crate::layout::BlockExtent;
use crate::metadata::voxel_count;
use crate::types::Shape;
use ndarray::{s, Array3, ArrayView3};
use num_traits::NumCast;
use tracing::warn;

/// Dense 3D grid of `i16` samples, indexed `[x, y, z]` with z varying fastest
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGrid {
    data: Array3<i16>,
}

impl VolumeGrid {
    /// Create a grid from samples in row-major (z fastest) order
    pub fn new(shape: Shape, samples: Vec<i16>) -> Result<Self> {
        let expected = validate_shape(shape)?;
        if samples.len() != expected {
            return Err(VolchunkError::InvalidShape(format!(
                "shape {:?} needs {} samples, got {}",
                shape,
                expected,
                samples.len()
            )));
        }

        let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), samples)?;
        Ok(Self { data })
    }

    /// Create a grid with every sample set to `value`
    pub fn filled(shape: Shape, value: i16) -> Result<Self> {
        let count = validate_shape(shape)?;
        let mut samples = Vec::new();
        samples.try_reserve_exact(count).map_err(|e| {
            VolchunkError::InvalidShape(format!("cannot allocate {:?} grid: {}", shape, e))
        })?;
        samples.resize(count, value);
        let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), samples)?;
        Ok(Self { data })
    }

    pub fn shape(&self) -> Shape {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2]
    }

    /// Total number of samples
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        let [sx, sy, sz] = self.shape();
        x < sx && y < sy && z < sz
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<i16> {
        self.data.get((x, y, z)).copied()
    }

    pub fn view(&self) -> ArrayView3<'_, i16> {
        self.data.view()
    }

    /// All samples in row-major order
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<i16> {
        self.samples().collect()
    }

    /// Copy one block's samples out in row-major order
    pub fn extract_block(&self, extent: &BlockExtent) -> Vec<i16> {
        self.data
            .slice(s![extent.x.clone(), extent.y.clone(), extent.z.clone()])
            .iter()
            .copied()
            .collect()
    }

    /// Overwrite one block's voxels with `samples` (row-major, extent-sized)
    pub fn place_block(&mut self, extent: &BlockExtent, samples: &[i16]) -> Result<()> {
        let dims = extent.dims();
        let block = ArrayView3::from_shape((dims[0], dims[1], dims[2]), samples)?;
        self.data
            .slice_mut(s![extent.x.clone(), extent.y.clone(), extent.z.clone()])
            .assign(&block);
        Ok(())
    }

    /// Whether every sample in the block equals `fill`
    pub fn block_is_fill(&self, extent: &BlockExtent, fill: i16) -> bool {
        self.data
            .slice(s![extent.x.clone(), extent.y.clone(), extent.z.clone()])
            .iter()
            .all(|&v| v == fill)
    }
}

/// Voxel count of a non-empty shape
fn validate_shape(shape: Shape) -> Result<usize> {
    if shape.iter().any(|&d| d == 0) {
        return Err(VolchunkError::InvalidShape(format!(
            "every dimension must be positive, got {:?}",
            shape
        )));
    }
    voxel_count(shape)
}

/// Outcome of narrowing wider samples to `i16`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastReport {
    /// Samples outside the `i16` range that were saturated
    pub saturated: usize,
    /// Samples with a fractional part that were rounded
    pub rounded: usize,
}

impl CastReport {
    pub fn is_lossless(&self) -> bool {
        self.saturated == 0 && self.rounded == 0
    }
}

/// Narrowing conversion from source samples to the stored `i16` width.
///
/// This is a deliberate precision reduction: values are rounded to the
/// nearest integer and saturated at the `i16` bounds. NaN maps to 0.
pub struct SampleCast;

impl SampleCast {
    pub fn to_i16(samples: &[f64]) -> (Vec<i16>, CastReport) {
        let mut report = CastReport::default();
        let out = samples
            .iter()
            .map(|&v| {
                if v.is_nan() {
                    report.rounded += 1;
                    return 0;
                }
                let r = v.round();
                if r != v {
                    report.rounded += 1;
                }
                match <i16 as NumCast>::from(r) {
                    Some(n) => n,
                    None => {
                        report.saturated += 1;
                        if r < 0.0 {
                            i16::MIN
                        } else {
                            i16::MAX
                        }
                    }
                }
            })
            .collect();
        (out, report)
    }

    /// Build a grid from wide samples, logging any precision loss
    pub fn grid_from_f64(shape: Shape, samples: &[f64]) -> Result<(VolumeGrid, CastReport)> {
        let (narrow, report) = Self::to_i16(samples);
        if !report.is_lossless() {
            warn!(
                saturated = report.saturated,
                rounded = report.rounded,
                "samples narrowed to i16 with precision loss"
            );
        }
        Ok((VolumeGrid::new(shape, narrow)?, report))
    }
}
