//! Quadtree tile bakery.
//!
//! Once primary thumbnails are in, every depth of the hierarchy is baked
//! into immutable composite bitmaps: the full extent, its four quadrants,
//! and `4^d` cells per deeper level. Cells of one depth bake in parallel.
//! The pyramid is discarded wholesale and rebaked when the point collection
//! changes; there is no incremental update.

use std::sync::Arc;

use artmap_core::quadtree::Quadtree;
use artmap_core::tiles::{TileKey, MAX_DEPTH, MAX_EDGE, MIN_TILE_EDGE};
use artmap_core::types::{BoundsRect, DataExtent, PointSet, PRIMARY_THUMB_SIZE};
use image::RgbaImage;
use rayon::prelude::*;
use thiserror::Error;

use crate::surface::{RasterSurface, RenderSurface, SurfaceError};

#[derive(Debug, Error)]
pub enum BakeError {
    /// Fatal to one cell only: the pipeline must have completed first, so a
    /// point without its primary thumbnail marks the cell invalid.
    #[error("missing primary thumbnail for {filename} while baking {key}")]
    MissingThumb { filename: String, key: String },

    /// Catastrophic: no rendering surface can be created, baking aborts and
    /// the renderer falls back to dynamic drawing permanently.
    #[error("could not create bake surface: {0}")]
    Surface(#[from] SurfaceError),

    #[error("cannot bake an empty point collection")]
    EmptyPointSet,
}

pub type BakeResult<T> = Result<T, BakeError>;

/// Configuration for one bake pass.
#[derive(Debug, Clone)]
pub struct BakeParams {
    /// Pixel edge of the depth-0 artifact; halves per depth.
    pub max_edge: u32,
    /// Cells whose artifact edge would fall below this are not baked.
    pub min_tile_edge: u32,
    /// Edge of the square each thumbnail is drawn at, in artifact pixels.
    pub thumb_px: u32,
    /// Background fill of every artifact.
    pub background: [u8; 4],
}

impl Default for BakeParams {
    fn default() -> Self {
        Self {
            max_edge: MAX_EDGE,
            min_tile_edge: MIN_TILE_EDGE,
            thumb_px: PRIMARY_THUMB_SIZE,
            background: [0, 0, 0, 0],
        }
    }
}

impl BakeParams {
    fn artifact_edge(&self, depth: u8) -> u32 {
        (self.max_edge >> depth).max(1)
    }
}

/// Immutable baked bitmap for one cell.
#[derive(Debug, Clone)]
pub struct TileArtifact {
    pub key: TileKey,
    image: Arc<RgbaImage>,
    pub point_count: usize,
}

impl TileArtifact {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

/// Bake state of one cell. `Empty` is explicit so the renderer can fall back
/// without re-checking bake state; `Failed` routes the LOD selector around a
/// cell whose bake hit a precondition failure.
#[derive(Debug, Clone, Default)]
pub enum TileSlot {
    #[default]
    Unbaked,
    Empty,
    Failed,
    Baked(TileArtifact),
}

impl TileSlot {
    pub fn artifact(&self) -> Option<&TileArtifact> {
        match self {
            TileSlot::Baked(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn is_baked(&self) -> bool {
        matches!(self, TileSlot::Baked(_))
    }
}

/// The fixed hierarchy of baked artifacts for one point collection.
#[derive(Debug, Default)]
pub struct TilePyramid {
    full: TileSlot,
    quadrants: [TileSlot; 4],
    /// Depth `d` slots at index `d - 2`, row-major per depth.
    quads: Vec<Vec<TileSlot>>,
}

impl TilePyramid {
    fn unbaked() -> Self {
        let mut quads = Vec::new();
        for depth in 2..=MAX_DEPTH {
            let n = TileKey::cells_per_axis(depth) as usize;
            quads.push((0..n * n).map(|_| TileSlot::Unbaked).collect());
        }
        Self {
            full: TileSlot::Unbaked,
            quadrants: Default::default(),
            quads,
        }
    }

    pub fn full(&self) -> &TileSlot {
        &self.full
    }

    pub fn quadrant(&self, ix: u32, iy: u32) -> &TileSlot {
        &self.quadrants[(iy * 2 + ix) as usize]
    }

    /// All slots of one depth (2..=MAX_DEPTH), row-major.
    pub fn depth_slots(&self, depth: u8) -> Option<&[TileSlot]> {
        if !(2..=MAX_DEPTH).contains(&depth) {
            return None;
        }
        self.quads.get((depth - 2) as usize).map(|v| v.as_slice())
    }

    pub fn slot(&self, key: &TileKey) -> Option<&TileSlot> {
        match key.depth {
            0 => Some(&self.full),
            1 => Some(self.quadrant(key.ix, key.iy)),
            _ => self
                .depth_slots(key.depth)
                .and_then(|slots| slots.get(key.flat_index())),
        }
    }

    fn set_slot(&mut self, key: &TileKey, slot: TileSlot) {
        match key.depth {
            0 => self.full = slot,
            1 => self.quadrants[(key.iy * 2 + key.ix) as usize] = slot,
            _ => {
                if let Some(slots) = self.quads.get_mut((key.depth - 2) as usize) {
                    slots[key.flat_index()] = slot;
                }
            }
        }
    }

    /// Shallowest depth within `2..=target` holding at least one baked
    /// artifact.
    pub fn best_baked_depth(&self, target: u8) -> Option<u8> {
        (2..=target.min(MAX_DEPTH))
            .find(|&depth| {
                self.depth_slots(depth)
                    .is_some_and(|slots| slots.iter().any(TileSlot::is_baked))
            })
    }

    /// Whether any artifact at any depth is usable.
    pub fn has_any_artifact(&self) -> bool {
        self.full.is_baked()
            || self.quadrants.iter().any(TileSlot::is_baked)
            || self
                .quads
                .iter()
                .any(|slots| slots.iter().any(TileSlot::is_baked))
    }
}

/// Data-space rectangle covered by a cell, accounting for the vertical flip
/// between tile space (y down) and data space (y up).
fn cell_data_rect(key: &TileKey, extent: &DataExtent) -> BoundsRect {
    let norm = key.norm_rect();
    let data_norm_y = 1.0 - (norm.y + norm.height);
    BoundsRect::new(
        extent.min_x + norm.x * extent.width(),
        extent.min_y + data_norm_y * extent.height(),
        norm.width * extent.width(),
        norm.height * extent.height(),
    )
}

struct CellBake {
    artifact: TileArtifact,
    /// Tile-space bounds to record per point index.
    bounds: Vec<(usize, BoundsRect)>,
}

/// Bake the whole pyramid from the current point collection.
///
/// Requires the streaming pipeline to have completed: a point without its
/// primary thumbnail fails every cell containing it (`Failed`), but the
/// other cells still bake. Only a surface-creation failure aborts the pass.
pub fn bake_pyramid(
    points: &mut PointSet,
    tree: &Quadtree,
    params: &BakeParams,
) -> BakeResult<TilePyramid> {
    let extent = points.extent().ok_or(BakeError::EmptyPointSet)?;

    for point in points.iter_mut() {
        point.clear_tile_bounds();
    }

    let mut pyramid = TilePyramid::unbaked();
    for depth in 0..=MAX_DEPTH {
        let edge = params.artifact_edge(depth);
        if edge < params.min_tile_edge {
            log::debug!("stopping at depth {depth}: artifact edge {edge} below minimum");
            break;
        }

        let cells: Vec<(TileKey, Vec<usize>)> = TileKey::keys_at_depth(depth)
            .into_iter()
            .map(|key| {
                let indices = if depth == 0 {
                    (0..points.len()).collect()
                } else {
                    tree.range_query(&cell_data_rect(&key, &extent))
                };
                (key, indices)
            })
            .collect();

        let shared: &PointSet = points;
        let baked: Vec<(TileKey, BakeResult<Option<CellBake>>)> = cells
            .par_iter()
            .map(|(key, indices)| {
                if indices.is_empty() {
                    return (*key, Ok(None));
                }
                (*key, bake_cell(shared, indices, *key, &extent, params).map(Some))
            })
            .collect();

        for (key, result) in baked {
            match result {
                Ok(None) => pyramid.set_slot(&key, TileSlot::Empty),
                Ok(Some(cell)) => {
                    for (index, bounds) in cell.bounds {
                        if let Some(point) = points.get_mut(index) {
                            point.record_bounds(key, bounds);
                        }
                    }
                    pyramid.set_slot(&key, TileSlot::Baked(cell.artifact));
                }
                Err(err @ BakeError::MissingThumb { .. }) => {
                    log::warn!("bake failed for {key}: {err}");
                    pyramid.set_slot(&key, TileSlot::Failed);
                }
                Err(err) => {
                    log::error!("aborting bake: {err}");
                    return Err(err);
                }
            }
        }
    }

    log::info!(
        "baked pyramid for {} points (full: {}, quadrants: {}/4)",
        points.len(),
        if pyramid.full.is_baked() { "ok" } else { "unusable" },
        pyramid.quadrants.iter().filter(|s| s.is_baked()).count()
    );
    Ok(pyramid)
}

fn bake_cell(
    points: &PointSet,
    indices: &[usize],
    key: TileKey,
    extent: &DataExtent,
    params: &BakeParams,
) -> BakeResult<CellBake> {
    let edge = params.artifact_edge(key.depth);
    let mut surface = RasterSurface::new(edge, edge)?;
    surface.clear(params.background);

    let cell = cell_data_rect(&key, extent);
    let cell_tile = key.tile_space_rect();
    // Local artifact pixels → shared tile space. 1.0 at the default edge.
    let tile_scale = cell_tile.width / edge as f64;

    let mut bounds = Vec::with_capacity(indices.len());
    for &index in indices {
        let Some(point) = points.get(index) else {
            continue;
        };
        let thumb = point
            .primary_thumb()
            .ok_or_else(|| BakeError::MissingThumb {
                filename: point.filename.clone(),
                key: key.to_string(),
            })?;

        // Independent linear x/y scales from the cell's data bounds into
        // [0, edge]², with y flipped so data "up" renders up.
        let px = (point.x - cell.x) / cell.width * edge as f64;
        let py = (1.0 - (point.y - cell.y) / cell.height) * edge as f64;
        let dest = BoundsRect::centered_square(px, py, params.thumb_px as f64);
        surface
            .draw_image(thumb.image(), dest)
            .map_err(BakeError::from)?;

        bounds.push((
            index,
            BoundsRect::centered_square(
                cell_tile.x + px * tile_scale,
                cell_tile.y + py * tile_scale,
                params.thumb_px as f64 * tile_scale,
            ),
        ));
    }

    Ok(CellBake {
        artifact: TileArtifact {
            key,
            image: Arc::new(surface.into_image()),
            point_count: indices.len(),
        },
        bounds,
    })
}
