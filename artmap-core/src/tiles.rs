//! Tile identity and cell geometry for the baked bitmap hierarchy.
//!
//! Depth `d` partitions the full data extent into `4^d` axis-aligned cells;
//! the cell edge in baked pixels halves with each depth increment, so every
//! depth shares one tile-space scale.

use std::fmt;

use crate::types::BoundsRect;

/// Edge length in pixels of the depth-0 (full extent) tile artifact.
pub const MAX_EDGE: u32 = 8192;

/// Cells whose baked edge would fall below this are never baked.
pub const MIN_TILE_EDGE: u32 = 512;

/// Deepest subdivision level baked.
pub const MAX_DEPTH: u8 = 3;

/// Identifies one cell of the baked hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub depth: u8,
    pub ix: u32,
    pub iy: u32,
}

impl TileKey {
    pub fn new(depth: u8, ix: u32, iy: u32) -> Self {
        Self { depth, ix, iy }
    }

    /// The depth-0 tile covering the full extent.
    pub fn full() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn quadrant(ix: u32, iy: u32) -> Self {
        Self::new(1, ix, iy)
    }

    /// Number of cells along one axis at a depth.
    pub fn cells_per_axis(depth: u8) -> u32 {
        1u32 << depth
    }

    /// Baked pixel edge of a cell at a depth.
    pub fn edge_px(depth: u8) -> u32 {
        MAX_EDGE >> depth
    }

    /// Cell rectangle in normalized extent coordinates ([0, 1]²).
    pub fn norm_rect(&self) -> BoundsRect {
        let n = Self::cells_per_axis(self.depth) as f64;
        BoundsRect::new(
            self.ix as f64 / n,
            self.iy as f64 / n,
            1.0 / n,
            1.0 / n,
        )
    }

    /// Cell rectangle in tile space ([0, MAX_EDGE]²).
    pub fn tile_space_rect(&self) -> BoundsRect {
        let edge = Self::edge_px(self.depth) as f64;
        BoundsRect::new(self.ix as f64 * edge, self.iy as f64 * edge, edge, edge)
    }

    /// All keys of one depth, row-major.
    pub fn keys_at_depth(depth: u8) -> Vec<TileKey> {
        let n = Self::cells_per_axis(depth);
        let mut keys = Vec::with_capacity((n * n) as usize);
        for iy in 0..n {
            for ix in 0..n {
                keys.push(TileKey::new(depth, ix, iy));
            }
        }
        keys
    }

    /// Flat row-major index of this key within its depth level.
    pub fn flat_index(&self) -> usize {
        let n = Self::cells_per_axis(self.depth) as usize;
        self.iy as usize * n + self.ix as usize
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth == 0 {
            write!(f, "full")
        } else {
            write!(f, "q{}-{}-{}", self.depth, self.ix, self.iy)
        }
    }
}
