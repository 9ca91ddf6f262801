//! Click hit-testing against whichever artifact the last frame displayed.

use artmap_core::tiles::TileKey;
use artmap_core::types::BoundsRect;
use artmap_render::draw::{dynamic_tile_rect, ActiveLod};

use crate::context::ViewContext;

/// Pixel tolerance around a point's bounds, in screen pixels.
pub const HIT_TOLERANCE_PX: f64 = 20.0;

/// Resolve a screen click to a point index, or None for a miss.
///
/// The click is inverted through the current transform into tile space and
/// compared against the bounds recorded for the artifact the last frame
/// drew (or the squares the dynamic band drew). First match in point order
/// wins; a miss is a no-op for the caller.
pub fn hit_test(ctx: &ViewContext, click_x: f64, click_y: f64) -> Option<usize> {
    let transform = ctx.transform;
    let (tx, ty) = transform.screen_to_tile(click_x, click_y);
    let tolerance = HIT_TOLERANCE_PX / transform.k;

    match ctx.active_lod() {
        ActiveLod::None => None,
        ActiveLod::Full => scan_key(ctx, &TileKey::full(), tx, ty, tolerance),
        ActiveLod::Quadrant(key) => scan_key(ctx, &key, tx, ty, tolerance),
        ActiveLod::Quads { depth } => {
            for (index, point) in ctx.points.points().iter().enumerate() {
                if let Some((_, bounds)) = point.bounds_at_depth(depth) {
                    if hits(bounds, tx, ty, tolerance) {
                        return Some(index);
                    }
                }
            }
            None
        }
        ActiveLod::Dynamic { drawn, .. } => {
            let extent = ctx.points.extent()?;
            for (index, point) in ctx.points.points().iter().enumerate() {
                let bounds = dynamic_tile_rect(point, &extent, drawn, transform.k);
                if hits(&bounds, tx, ty, tolerance) {
                    return Some(index);
                }
            }
            None
        }
    }
}

fn scan_key(ctx: &ViewContext, key: &TileKey, tx: f64, ty: f64, tolerance: f64) -> Option<usize> {
    for (index, point) in ctx.points.points().iter().enumerate() {
        if let Some(bounds) = point.bounds_for(key) {
            if hits(bounds, tx, ty, tolerance) {
                return Some(index);
            }
        }
    }
    None
}

fn hits(bounds: &BoundsRect, tx: f64, ty: f64, tolerance: f64) -> bool {
    bounds.expanded(tolerance).contains(tx, ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use artmap_core::transform::Viewport;
    use artmap_core::types::{Point, ThumbHandle, PRIMARY_THUMB_SIZE};
    use artmap_render::surface::RasterSurface;
    use image::RgbaImage;

    fn loaded_point(filename: &str, x: f64, y: f64) -> Point {
        let mut p = Point::new(filename.into(), "artist".into(), x, y);
        p.set_thumb(
            PRIMARY_THUMB_SIZE,
            ThumbHandle::new(RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]))),
        );
        p.hydrate_secondary_sizes();
        p
    }

    #[test]
    fn test_dynamic_hit_matches_drawn_square_and_misses_elsewhere() {
        let viewport = Viewport::new(400.0, 300.0);
        let mut ctx = ViewContext::new(viewport);
        ctx.install_run(vec![
            loaded_point("a.jpg", 0.0, 0.0),
            loaded_point("b.jpg", 1.0, 1.0),
        ]);

        // No pyramid: the frame falls back to dynamic drawing.
        let mut surface = RasterSurface::new(400, 300).unwrap();
        ctx.render(&mut surface);
        assert!(matches!(ctx.active_lod(), ActiveLod::Dynamic { .. }));

        let extent = ctx.points.extent().unwrap();
        let (sx, sy) = ctx.transform.data_to_screen(0.0, 0.0, &extent);
        assert_eq!(ctx.hit_test(sx, sy), Some(0));

        let (sx, sy) = ctx.transform.data_to_screen(1.0, 1.0, &extent);
        assert_eq!(ctx.hit_test(sx, sy), Some(1));

        // Far off both squares: a miss.
        assert_eq!(ctx.hit_test(-4000.0, -4000.0), None);
    }

    #[test]
    fn test_hit_before_any_frame_is_a_miss() {
        let ctx = ViewContext::new(Viewport::new(100.0, 100.0));
        assert_eq!(ctx.hit_test(50.0, 50.0), None);
    }
}
