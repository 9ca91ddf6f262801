//! Pan/zoom transform and viewport math.
//!
//! Three coordinate spaces are involved:
//! - **data space**: the raw projected coordinates points arrive with;
//! - **tile space**: the fixed `[0, MAX_EDGE]²` pixel space the full data
//!   extent is baked into (y grows downward, so data "up" renders up);
//! - **screen space**: surface pixels, `screen = tile * k + (x, y)`.

use crate::tiles::MAX_EDGE;
use crate::types::{BoundsRect, DataExtent};

/// Lower clamp for the zoom scale.
pub const K_MIN: f64 = 0.01;
/// Upper clamp for the zoom scale.
pub const K_MAX: f64 = 20.0;

/// The single shared piece of mutable view state: translation in screen
/// pixels plus a uniform scale factor, always clamped to `[K_MIN, K_MAX]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub k: f64,
}

impl Transform {
    pub fn new(x: f64, y: f64, k: f64) -> Self {
        Self {
            x,
            y,
            k: k.clamp(K_MIN, K_MAX),
        }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    pub fn tile_to_screen(&self, tx: f64, ty: f64) -> (f64, f64) {
        (tx * self.k + self.x, ty * self.k + self.y)
    }

    pub fn screen_to_tile(&self, sx: f64, sy: f64) -> (f64, f64) {
        ((sx - self.x) / self.k, (sy - self.y) / self.k)
    }

    pub fn data_to_screen(&self, x: f64, y: f64, extent: &DataExtent) -> (f64, f64) {
        let (tx, ty) = data_to_tile(x, y, extent);
        self.tile_to_screen(tx, ty)
    }

    pub fn screen_to_data(&self, sx: f64, sy: f64, extent: &DataExtent) -> (f64, f64) {
        let (tx, ty) = self.screen_to_tile(sx, sy);
        tile_to_data(tx, ty, extent)
    }

    /// Tile-space rectangle mapped to screen space.
    pub fn tile_rect_to_screen(&self, rect: &BoundsRect) -> BoundsRect {
        let (x, y) = self.tile_to_screen(rect.x, rect.y);
        BoundsRect::new(x, y, rect.width * self.k, rect.height * self.k)
    }

    /// New transform translated by a screen-space drag delta.
    pub fn pan_by(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            k: self.k,
        }
    }

    /// New transform scaled by `factor` keeping the given screen point fixed.
    pub fn zoom_about(&self, anchor_x: f64, anchor_y: f64, factor: f64) -> Self {
        let k = (self.k * factor).clamp(K_MIN, K_MAX);
        let ratio = k / self.k;
        Self {
            x: anchor_x - (anchor_x - self.x) * ratio,
            y: anchor_y - (anchor_y - self.y) * ratio,
            k,
        }
    }

    /// Component-wise interpolation between two transforms; `t` in [0, 1].
    pub fn lerp(from: &Transform, to: &Transform, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            from.x + (to.x - from.x) * t,
            from.y + (to.y - from.y) * t,
            from.k + (to.k - from.k) * t,
        )
    }
}

/// Data coordinates mapped into tile space. Y flips so increasing data y
/// moves toward the top of the baked bitmap.
pub fn data_to_tile(x: f64, y: f64, extent: &DataExtent) -> (f64, f64) {
    let edge = MAX_EDGE as f64;
    (
        extent.norm_x(x) * edge,
        (1.0 - extent.norm_y(y)) * edge,
    )
}

pub fn tile_to_data(tx: f64, ty: f64, extent: &DataExtent) -> (f64, f64) {
    let edge = MAX_EDGE as f64;
    (
        extent.min_x + (tx / edge) * extent.width(),
        extent.min_y + (1.0 - ty / edge) * extent.height(),
    )
}

/// Screen size of the rendering surface in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// The visible region in tile space, with the screen rectangle first
    /// expanded by `margin_frac` of its size on each side.
    pub fn visible_tile_rect(&self, transform: &Transform, margin_frac: f64) -> BoundsRect {
        let screen = BoundsRect::new(0.0, 0.0, self.width, self.height).expanded_frac(margin_frac);
        let (tx, ty) = transform.screen_to_tile(screen.x, screen.y);
        BoundsRect::new(tx, ty, screen.width / transform.k, screen.height / transform.k)
    }

    /// Transform that fits the full tile extent inside the viewport,
    /// centered.
    pub fn fit_transform(&self) -> Transform {
        let edge = MAX_EDGE as f64;
        let k = (self.width / edge).min(self.height / edge);
        let k = k.clamp(K_MIN, K_MAX);
        Transform {
            x: (self.width - edge * k) / 2.0,
            y: (self.height - edge * k) / 2.0,
            k,
        }
    }

    /// Transform showing tile space 1:1, centered on the tile midpoint.
    pub fn actual_size_transform(&self) -> Transform {
        let edge = MAX_EDGE as f64;
        Transform {
            x: (self.width - edge) / 2.0,
            y: (self.height - edge) / 2.0,
            k: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_extent() -> DataExtent {
        DataExtent::from_points(vec![(0.0, 0.0), (1.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_scale_is_clamped() {
        assert_eq!(Transform::new(0.0, 0.0, 100.0).k, K_MAX);
        assert_eq!(Transform::new(0.0, 0.0, 0.0001).k, K_MIN);
    }

    #[test]
    fn test_screen_data_round_trip() {
        let extent = unit_extent();
        let transforms = [
            Transform::new(0.0, 0.0, 1.0),
            Transform::new(-300.5, 812.25, 0.37),
            Transform::new(4096.0, -2048.0, 17.5),
            Transform::new(12.0, 9.0, K_MIN),
        ];
        for t in transforms {
            for p in [(0.0, 0.0), (123.0, 456.0), (-50.0, 999.5)] {
                let (dx, dy) = t.screen_to_data(p.0, p.1, &extent);
                let (sx, sy) = t.data_to_screen(dx, dy, &extent);
                assert!((sx - p.0).abs() < 1e-6, "x round trip at k={}", t.k);
                assert!((sy - p.1).abs() < 1e-6, "y round trip at k={}", t.k);
            }
        }
    }

    #[test]
    fn test_data_up_maps_to_tile_top() {
        let extent = unit_extent();
        let (_, ty_high) = data_to_tile(0.5, 1.0, &extent);
        let (_, ty_low) = data_to_tile(0.5, 0.0, &extent);
        assert_eq!(ty_high, 0.0);
        assert_eq!(ty_low, MAX_EDGE as f64);
    }

    #[test]
    fn test_pan_keeps_scale() {
        let t = Transform::new(5.0, 5.0, 3.0).pan_by(-12.0, 30.0);
        assert_eq!((t.x, t.y, t.k), (-7.0, 35.0, 3.0));
    }

    #[test]
    fn test_zoom_about_keeps_anchor_fixed() {
        let t = Transform::new(100.0, -40.0, 2.0);
        let anchor = (320.0, 240.0);
        let (tile_x, tile_y) = t.screen_to_tile(anchor.0, anchor.1);

        let zoomed = t.zoom_about(anchor.0, anchor.1, 1.75);
        let (sx, sy) = zoomed.tile_to_screen(tile_x, tile_y);

        assert!((sx - anchor.0).abs() < 1e-9);
        assert!((sy - anchor.1).abs() < 1e-9);
        assert!((zoomed.k - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_fit_transform_contains_full_extent() {
        let viewport = Viewport::new(800.0, 600.0);
        let t = viewport.fit_transform();
        let edge = MAX_EDGE as f64;

        let (x0, y0) = t.tile_to_screen(0.0, 0.0);
        let (x1, y1) = t.tile_to_screen(edge, edge);
        assert!(x0 >= -1e-9 && y0 >= -1e-9);
        assert!(x1 <= 800.0 + 1e-9 && y1 <= 600.0 + 1e-9);
    }

    #[test]
    fn test_visible_rect_margin_grows_with_inverse_scale() {
        let viewport = Viewport::new(100.0, 100.0);
        let t = Transform::new(0.0, 0.0, 2.0);
        let plain = viewport.visible_tile_rect(&t, 0.0);
        let margined = viewport.visible_tile_rect(&t, 0.1);

        assert_eq!(plain.width, 50.0);
        assert!(margined.width > plain.width);
        assert!(margined.x < plain.x);
    }
}
