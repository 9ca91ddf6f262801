//! Frame rendering: picks the best available artifact for the current
//! transform and draws it, falling back band by band down to dynamic
//! per-point thumbnails. Per-frame draw errors are logged, never thrown,
//! and the surface transform is restored whatever happens.

use artmap_core::transform::{data_to_tile, Transform, Viewport};
use artmap_core::types::{BoundsRect, DataExtent, Point, PointSet};

use crate::bake::{TilePyramid, TileSlot};
use crate::lod::{
    band_for_scale, bucket_for_scale, quadrant_for, target_depth, LodBand, VIEW_MARGIN_FRAC,
};
use crate::surface::{RenderSurface, TransformGuard};
use artmap_core::tiles::{TileKey, MAX_EDGE};

/// Fill used for a point whose thumbnail has not arrived yet.
const MISSING_FILL: [u8; 4] = [46, 46, 46, 255];

/// What the last frame actually drew; hit testing keys off this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveLod {
    /// Nothing drawable (no points yet).
    None,
    Full,
    Quadrant(TileKey),
    Quads { depth: u8 },
    Dynamic { loaded: u32, drawn: f64 },
}

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    pub lod: ActiveLod,
    pub tiles_drawn: usize,
    pub points_drawn: usize,
}

impl FrameReport {
    fn empty() -> Self {
        Self {
            lod: ActiveLod::None,
            tiles_drawn: 0,
            points_drawn: 0,
        }
    }
}

/// Tile-space square a point occupies in the dynamic band. Shared with hit
/// testing so clicks match exactly what was drawn.
pub fn dynamic_tile_rect(point: &Point, extent: &DataExtent, drawn: f64, k: f64) -> BoundsRect {
    let (tx, ty) = data_to_tile(point.x, point.y, extent);
    BoundsRect::centered_square(tx, ty, drawn / k)
}

/// Render one frame. Tolerates partially populated state: missing
/// thumbnails render as flat placeholders, missing tiles fall back to the
/// next band, and an entirely unusable pyramid means dynamic rendering.
pub fn render_frame<S: RenderSurface>(
    surface: &mut S,
    points: &PointSet,
    pyramid: Option<&TilePyramid>,
    transform: Transform,
    viewport: Viewport,
    background: [u8; 4],
) -> FrameReport {
    surface.clear(background);
    let Some(extent) = points.extent() else {
        return FrameReport::empty();
    };

    let mut guard = TransformGuard::new(surface, transform);
    draw_banded(&mut *guard, points, pyramid, &transform, &viewport, &extent)
}

fn draw_banded<S: RenderSurface + ?Sized>(
    surface: &mut S,
    points: &PointSet,
    pyramid: Option<&TilePyramid>,
    transform: &Transform,
    viewport: &Viewport,
    extent: &DataExtent,
) -> FrameReport {
    let k = transform.k;
    if let Some(pyramid) = pyramid {
        match band_for_scale(k) {
            LodBand::Full => {
                if let Some(report) = draw_full(surface, pyramid) {
                    return report;
                }
            }
            LodBand::Quadrant => {
                let (ix, iy) = quadrant_for(transform);
                if let Some(artifact) = pyramid.quadrant(ix, iy).artifact() {
                    draw_tile(surface, artifact.image(), artifact.key.tile_space_rect());
                    return FrameReport {
                        lod: ActiveLod::Quadrant(artifact.key),
                        tiles_drawn: 1,
                        points_drawn: 0,
                    };
                }
                if let Some(report) = draw_full(surface, pyramid) {
                    return report;
                }
            }
            LodBand::Quads => {
                if let Some(depth) = pyramid.best_baked_depth(target_depth(k)) {
                    return draw_quads(surface, pyramid, depth, transform, viewport);
                }
            }
            LodBand::Dynamic => {}
        }
    }
    draw_dynamic(surface, points, transform, viewport, extent)
}

fn draw_full<S: RenderSurface + ?Sized>(
    surface: &mut S,
    pyramid: &TilePyramid,
) -> Option<FrameReport> {
    let artifact = pyramid.full().artifact()?;
    let edge = MAX_EDGE as f64;
    draw_tile(surface, artifact.image(), BoundsRect::new(0.0, 0.0, edge, edge));
    Some(FrameReport {
        lod: ActiveLod::Full,
        tiles_drawn: 1,
        points_drawn: 0,
    })
}

fn draw_quads<S: RenderSurface + ?Sized>(
    surface: &mut S,
    pyramid: &TilePyramid,
    depth: u8,
    transform: &Transform,
    viewport: &Viewport,
) -> FrameReport {
    let view = viewport.visible_tile_rect(transform, VIEW_MARGIN_FRAC);
    let mut tiles_drawn = 0;
    if let Some(slots) = pyramid.depth_slots(depth) {
        for slot in slots {
            // Invalid or missing cells are skipped, not substituted.
            let TileSlot::Baked(artifact) = slot else {
                continue;
            };
            let rect = artifact.key.tile_space_rect();
            if !rect.intersects(&view) {
                continue;
            }
            draw_tile(surface, artifact.image(), rect);
            tiles_drawn += 1;
        }
    }
    FrameReport {
        lod: ActiveLod::Quads { depth },
        tiles_drawn,
        points_drawn: 0,
    }
}

fn draw_dynamic<S: RenderSurface + ?Sized>(
    surface: &mut S,
    points: &PointSet,
    transform: &Transform,
    viewport: &Viewport,
    extent: &DataExtent,
) -> FrameReport {
    let k = transform.k;
    let bucket = bucket_for_scale(k);
    let view = viewport.visible_tile_rect(transform, VIEW_MARGIN_FRAC);
    let half_extra = bucket.drawn / k / 2.0;
    let (view_cx, view_cy) = view.center();

    // Cull to the margined viewport, keeping squared view-center distance
    // for the painter's sort below.
    let mut visible: Vec<(usize, f64, BoundsRect)> = Vec::new();
    for (index, point) in points.points().iter().enumerate() {
        let rect = dynamic_tile_rect(point, extent, bucket.drawn, k);
        if !rect.expanded(half_extra).intersects(&view) {
            continue;
        }
        let (cx, cy) = rect.center();
        let (dx, dy) = (cx - view_cx, cy - view_cy);
        visible.push((index, dx * dx + dy * dy, rect));
    }

    // Farthest from the view center first, so nearer points draw on top.
    visible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut points_drawn = 0;
    for (index, _, rect) in visible {
        let point = &points.points()[index];
        match point.thumb_or_nearest(bucket.loaded) {
            Some((_, handle)) => {
                if let Err(err) = surface.draw_image(handle.image(), rect) {
                    log::error!("dynamic draw failed for {}: {err}", point.filename);
                } else {
                    points_drawn += 1;
                }
            }
            None => {
                // Thumbnail still streaming in; render a flat stand-in.
                if let Err(err) = surface.fill_rect(MISSING_FILL, rect) {
                    log::error!("placeholder fill failed for {}: {err}", point.filename);
                }
            }
        }
    }

    FrameReport {
        lod: ActiveLod::Dynamic {
            loaded: bucket.loaded,
            drawn: bucket.drawn,
        },
        tiles_drawn: 0,
        points_drawn,
    }
}

fn draw_tile<S: RenderSurface + ?Sized>(
    surface: &mut S,
    image: &image::RgbaImage,
    rect: BoundsRect,
) {
    if let Err(err) = surface.draw_image(image, rect) {
        log::error!("tile draw failed: {err}");
    }
}
