//! Zoom-band level-of-detail selection.
//!
//! Bands over the continuous zoom scale `k`, coarsest first:
//! full bitmap, quadrant bitmap, depth-d quad tiles, then dynamic
//! per-point thumbnails once the baked resolution runs out.

use artmap_core::tiles::{MAX_DEPTH, MAX_EDGE};
use artmap_core::transform::Transform;

/// Below this the full artifact is drawn.
pub const QUADRANT_MIN_K: f64 = 0.5;
/// Below this (and at least `QUADRANT_MIN_K`) one quadrant is drawn.
pub const QUADS_MIN_K: f64 = 1.5;
/// From here on baked tiles are outresolved and points draw individually.
pub const DYNAMIC_MIN_K: f64 = 8.0;

/// Fractional margin added around the viewport when culling tiles/points.
pub const VIEW_MARGIN_FRAC: f64 = 0.1;

/// Ideal rendering band for a zoom scale, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LodBand {
    Full,
    Quadrant,
    Quads,
    Dynamic,
}

pub fn band_for_scale(k: f64) -> LodBand {
    if k < QUADRANT_MIN_K {
        LodBand::Full
    } else if k < QUADS_MIN_K {
        LodBand::Quadrant
    } else if k < DYNAMIC_MIN_K {
        LodBand::Quads
    } else {
        LodBand::Dynamic
    }
}

/// Target quad depth for a scale in the quads band: `floor(log2 k) + 2`,
/// clamped to the baked range.
pub fn target_depth(k: f64) -> u8 {
    let ideal = (k.max(f64::MIN_POSITIVE).log2() + 2.0).floor();
    (ideal.max(2.0) as u8).min(MAX_DEPTH)
}

/// Quadrant cell under the view origin: the transform's translation mapped
/// into normalized tile space and compared against the midline per axis.
pub fn quadrant_for(transform: &Transform) -> (u32, u32) {
    let edge = MAX_EDGE as f64;
    let tx = -transform.x / (edge * transform.k);
    let ty = -transform.y / (edge * transform.k);
    let ix = if tx < 0.5 { 0 } else { 1 };
    let iy = if ty < 0.5 { 0 } else { 1 };
    (ix, iy)
}

/// One row of the dynamic-band size table: for scales up to `max_k`, load
/// thumbnails at `loaded` source pixels and draw them `drawn` screen pixels
/// wide.
#[derive(Debug, Clone, Copy)]
pub struct SizeBucket {
    pub max_k: f64,
    pub loaded: u32,
    pub drawn: f64,
}

/// Fixed `k → (loaded, drawn)` table for dynamic per-point rendering.
pub const DYNAMIC_BUCKETS: [SizeBucket; 3] = [
    SizeBucket {
        max_k: 10.0,
        loaded: 125,
        drawn: 96.0,
    },
    SizeBucket {
        max_k: 15.0,
        loaded: 250,
        drawn: 192.0,
    },
    SizeBucket {
        max_k: f64::INFINITY,
        loaded: 500,
        drawn: 320.0,
    },
];

pub fn bucket_for_scale(k: f64) -> SizeBucket {
    for bucket in DYNAMIC_BUCKETS {
        if k <= bucket.max_k {
            return bucket;
        }
    }
    DYNAMIC_BUCKETS[DYNAMIC_BUCKETS.len() - 1]
}
