//! Block partitioning - how a volume is divided into fixed-edge blocks

use crate::error::{Result, VolchunkError};
use crate::types::{BlockCoord, Shape};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Default block edge length in voxels
pub const DEFAULT_BLOCK_EDGE: usize = 64;

/// Voxel ranges covered by one block, clamped to the volume bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockExtent {
    pub x: Range<usize>,
    pub y: Range<usize>,
    pub z: Range<usize>,
}

impl BlockExtent {
    /// Extent length along each axis
    pub fn dims(&self) -> Shape {
        [self.x.len(), self.y.len(), self.z.len()]
    }

    /// Number of voxels in the block
    pub fn voxel_count(&self) -> usize {
        self.dims().iter().product()
    }

    /// Whether the voxel lies inside this extent
    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        self.x.contains(&x) && self.y.contains(&y) && self.z.contains(&z)
    }
}

/// Computes the block grid and per-block extents for a volume shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPartitioner {
    block_edge: usize,
}

impl BlockPartitioner {
    /// Create a partitioner with the given block edge length
    pub fn new(block_edge: usize) -> Result<Self> {
        if block_edge == 0 {
            return Err(VolchunkError::Configuration(
                "Block edge length must be positive".to_string(),
            ));
        }
        Ok(Self { block_edge })
    }

    pub fn block_edge(&self) -> usize {
        self.block_edge
    }

    /// Number of blocks along each axis: `ceil(dim / edge)`
    pub fn grid_dims(&self, shape: Shape) -> Shape {
        shape.map(|dim| dim.div_ceil(self.block_edge))
    }

    /// Total number of blocks
    pub fn total_blocks(&self, shape: Shape) -> usize {
        self.grid_dims(shape).iter().product()
    }

    /// Whether the coordinate lies inside the block grid of `shape`
    pub fn contains_block(&self, shape: Shape, coord: BlockCoord) -> bool {
        let grid = self.grid_dims(shape);
        coord
            .to_array()
            .iter()
            .zip(grid.iter())
            .all(|(&c, &g)| c < g)
    }

    /// Voxel ranges of a block; the upper bound is always clamped to the shape
    pub fn block_extent(&self, shape: Shape, coord: BlockCoord) -> BlockExtent {
        let [x, y, z] = [0, 1, 2].map(|axis| {
            let c = coord.to_array()[axis];
            let start = (c * self.block_edge).min(shape[axis]);
            let end = (start + self.block_edge).min(shape[axis]);
            start..end
        });
        BlockExtent { x, y, z }
    }

    /// All block coordinates in raster order (i outer, k inner)
    pub fn blocks(&self, shape: Shape) -> impl Iterator<Item = BlockCoord> {
        let [gi, gj, gk] = self.grid_dims(shape);
        (0..gi).flat_map(move |i| {
            (0..gj).flat_map(move |j| (0..gk).map(move |k| BlockCoord::new(i, j, k)))
        })
    }

    /// Get a summary string of the partitioning
    pub fn summary(&self, shape: Shape) -> String {
        let grid = self.grid_dims(shape);
        format!(
            "{} x {} x {} volume, edge {}: {} x {} x {} = {} blocks",
            shape[0],
            shape[1],
            shape[2],
            self.block_edge,
            grid[0],
            grid[1],
            grid[2],
            self.total_blocks(shape)
        )
    }
}

impl Default for BlockPartitioner {
    fn default() -> Self {
        Self {
            block_edge: DEFAULT_BLOCK_EDGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_edge_rejected() {
        assert!(BlockPartitioner::new(0).is_err());
    }

    #[test]
    fn test_grid_dims() {
        let p = BlockPartitioner::default();
        assert_eq!(p.grid_dims([1000, 800, 500]), [16, 13, 8]);
        assert_eq!(p.grid_dims([64, 64, 64]), [1, 1, 1]);
        assert_eq!(p.grid_dims([65, 1, 1]), [2, 1, 1]);
    }

    #[test]
    fn test_boundary_blocks_130() {
        let p = BlockPartitioner::default();
        let shape = [130, 130, 130];
        assert_eq!(p.grid_dims(shape), [3, 3, 3]);

        for coord in p.blocks(shape) {
            let dims = p.block_extent(shape, coord).dims();
            for (axis, &c) in coord.to_array().iter().enumerate() {
                let expected = if c == 2 { 2 } else { 64 };
                assert_eq!(dims[axis], expected, "block {} axis {}", coord, axis);
            }
        }
    }

    #[test]
    fn test_block_extent_clamped() {
        let p = BlockPartitioner::default();
        let extent = p.block_extent([1000, 800, 500], BlockCoord::new(15, 12, 7));
        assert_eq!(extent.x, 960..1000);
        assert_eq!(extent.y, 768..800);
        assert_eq!(extent.z, 448..500);
    }

    #[test]
    fn test_raster_order() {
        let p = BlockPartitioner::new(2).unwrap();
        let coords: Vec<BlockCoord> = p.blocks([3, 3, 3]).collect();
        assert_eq!(coords.len(), 8);
        assert_eq!(coords[0], BlockCoord::new(0, 0, 0));
        assert_eq!(coords[1], BlockCoord::new(0, 0, 1));
        assert_eq!(coords[2], BlockCoord::new(0, 1, 0));
        assert_eq!(coords[7], BlockCoord::new(1, 1, 1));
    }

    #[test]
    fn test_empty_axis_has_no_blocks() {
        let p = BlockPartitioner::default();
        let shape = [130, 0, 7];
        assert_eq!(p.grid_dims(shape), [3, 0, 1]);
        assert_eq!(p.total_blocks(shape), 0);
        assert_eq!(p.blocks(shape).count(), 0);
        assert!(!p.contains_block(shape, BlockCoord::new(0, 0, 0)));
        assert!(p.summary(shape).ends_with("= 0 blocks"));
    }

    #[test]
    fn test_contains_block() {
        let p = BlockPartitioner::default();
        assert!(p.contains_block([130, 130, 130], BlockCoord::new(2, 2, 2)));
        assert!(!p.contains_block([130, 130, 130], BlockCoord::new(3, 0, 0)));
    }

    proptest! {
        #[test]
        fn test_partition_covers_volume_exactly(
            x in 1usize..40,
            y in 1usize..40,
            z in 1usize..40,
            edge in 1usize..17,
        ) {
            let p = BlockPartitioner::new(edge).unwrap();
            let shape = [x, y, z];
            let mut hits = vec![0u8; x * y * z];

            for coord in p.blocks(shape) {
                let extent = p.block_extent(shape, coord);
                prop_assert!(extent.voxel_count() > 0);
                for vx in extent.x.clone() {
                    for vy in extent.y.clone() {
                        for vz in extent.z.clone() {
                            hits[(vx * y + vy) * z + vz] += 1;
                        }
                    }
                }
            }

            prop_assert!(hits.iter().all(|&h| h == 1));
        }
    }
}
