//! Offscreen rendering surface.
//!
//! Draw calls take rectangles in the surface's current transformed space;
//! [`TransformGuard`] applies a transform for the duration of a frame and
//! restores identity when dropped, so a failure mid-frame can never leave
//! the surface scaled for whoever draws or hit-tests next.

use std::ops::{Deref, DerefMut};

use artmap_core::transform::Transform;
use artmap_core::types::BoundsRect;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use thiserror::Error;

/// Largest accepted surface edge, matching the largest baked tile.
pub const MAX_SURFACE_EDGE: u32 = 16_384;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("invalid surface size {width}x{height} (edges must be 1..={max})")]
    InvalidSize { width: u32, height: u32, max: u32 },

    #[error("draw failed: {message}")]
    Draw { message: String },
}

pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Target for both tile baking and frame rendering.
pub trait RenderSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn clear(&mut self, rgba: [u8; 4]);

    fn set_transform(&mut self, transform: Transform);
    fn reset_transform(&mut self);
    fn transform(&self) -> Transform;

    /// Draw `source` scaled into `dest`, given in current transformed space.
    fn draw_image(&mut self, source: &RgbaImage, dest: BoundsRect) -> SurfaceResult<()>;

    /// Fill `dest` (current transformed space) with a solid color.
    fn fill_rect(&mut self, rgba: [u8; 4], dest: BoundsRect) -> SurfaceResult<()>;
}

/// Applies a transform on creation and guarantees the reset on drop,
/// whatever path the frame takes out of scope.
pub struct TransformGuard<'a, S: RenderSurface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: RenderSurface + ?Sized> TransformGuard<'a, S> {
    pub fn new(surface: &'a mut S, transform: Transform) -> Self {
        surface.set_transform(transform);
        Self { surface }
    }
}

impl<S: RenderSurface + ?Sized> Deref for TransformGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> DerefMut for TransformGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> Drop for TransformGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.reset_transform();
    }
}

/// CPU surface over an RGBA pixel buffer.
#[derive(Debug)]
pub struct RasterSurface {
    image: RgbaImage,
    transform: Transform,
}

impl RasterSurface {
    /// Fails when the requested size cannot back a surface; callers treat
    /// this as the catastrophic setup case and fall back to dynamic
    /// rendering permanently.
    pub fn new(width: u32, height: u32) -> SurfaceResult<Self> {
        if width == 0 || height == 0 || width > MAX_SURFACE_EDGE || height > MAX_SURFACE_EDGE {
            return Err(SurfaceError::InvalidSize {
                width,
                height,
                max: MAX_SURFACE_EDGE,
            });
        }
        Ok(Self {
            image: RgbaImage::new(width, height),
            transform: Transform::identity(),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Destination rectangle in device pixels for a rect in current space.
    fn device_rect(&self, dest: &BoundsRect) -> BoundsRect {
        self.transform.tile_rect_to_screen(dest)
    }

    fn is_offscreen(&self, rect: &BoundsRect) -> bool {
        rect.max_x() < 0.0
            || rect.max_y() < 0.0
            || rect.x >= self.image.width() as f64
            || rect.y >= self.image.height() as f64
    }
}

impl RenderSurface for RasterSurface {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba(rgba);
        }
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    fn reset_transform(&mut self) {
        self.transform = Transform::identity();
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn draw_image(&mut self, source: &RgbaImage, dest: BoundsRect) -> SurfaceResult<()> {
        let device = self.device_rect(&dest);
        if self.is_offscreen(&device) || source.width() == 0 || source.height() == 0 {
            return Ok(());
        }

        // Clip to the surface before resampling; a tile can be orders of
        // magnitude larger than its visible portion at high zoom.
        let vis_x0 = device.x.max(0.0);
        let vis_y0 = device.y.max(0.0);
        let vis_x1 = device.max_x().min(self.image.width() as f64);
        let vis_y1 = device.max_y().min(self.image.height() as f64);
        let target_w = (vis_x1 - vis_x0).round() as u32;
        let target_h = (vis_y1 - vis_y0).round() as u32;
        if target_w == 0 || target_h == 0 {
            return Ok(());
        }

        let fully_visible = device.x >= 0.0
            && device.y >= 0.0
            && device.max_x() <= self.image.width() as f64
            && device.max_y() <= self.image.height() as f64;
        if fully_visible && source.width() == target_w && source.height() == target_h {
            imageops::overlay(&mut self.image, source, device.x as i64, device.y as i64);
            return Ok(());
        }

        // Source region corresponding to the visible device region.
        let src_w = source.width() as f64;
        let src_h = source.height() as f64;
        let sx0 = ((vis_x0 - device.x) / device.width * src_w).floor().clamp(0.0, src_w - 1.0);
        let sy0 = ((vis_y0 - device.y) / device.height * src_h).floor().clamp(0.0, src_h - 1.0);
        let sx1 = ((vis_x1 - device.x) / device.width * src_w).ceil().clamp(sx0 + 1.0, src_w);
        let sy1 = ((vis_y1 - device.y) / device.height * src_h).ceil().clamp(sy0 + 1.0, src_h);
        let crop = imageops::crop_imm(
            source,
            sx0 as u32,
            sy0 as u32,
            (sx1 - sx0) as u32,
            (sy1 - sy0) as u32,
        )
        .to_image();

        let scaled = if crop.width() == target_w && crop.height() == target_h {
            crop
        } else {
            imageops::resize(&crop, target_w, target_h, FilterType::Triangle)
        };
        imageops::overlay(&mut self.image, &scaled, vis_x0 as i64, vis_y0 as i64);
        Ok(())
    }

    fn fill_rect(&mut self, rgba: [u8; 4], dest: BoundsRect) -> SurfaceResult<()> {
        let device = self.device_rect(&dest);
        if self.is_offscreen(&device) {
            return Ok(());
        }
        let x0 = device.x.max(0.0) as u32;
        let y0 = device.y.max(0.0) as u32;
        let x1 = (device.max_x().min(self.image.width() as f64)).max(0.0) as u32;
        let y1 = (device.max_y().min(self.image.height() as f64)).max(0.0) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                self.image.put_pixel(x, y, Rgba(rgba));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unbackable_sizes() {
        assert!(matches!(
            RasterSurface::new(0, 100),
            Err(SurfaceError::InvalidSize { .. })
        ));
        assert!(RasterSurface::new(MAX_SURFACE_EDGE + 1, 16).is_err());
        assert!(RasterSurface::new(64, 64).is_ok());
    }

    #[test]
    fn test_draw_image_respects_transform() {
        let mut surface = RasterSurface::new(40, 40).unwrap();
        let dot = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));

        // Scale 2, translate (10, 10): a 2x2 image at space (5, 5) lands at
        // device (20, 20) as a 4x4 block.
        surface.set_transform(Transform::new(10.0, 10.0, 2.0));
        surface
            .draw_image(&dot, BoundsRect::new(5.0, 5.0, 2.0, 2.0))
            .unwrap();
        surface.reset_transform();

        assert_eq!(surface.image().get_pixel(20, 20).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(23, 23).0, [255, 0, 0, 255]);
        assert_eq!(surface.image().get_pixel(25, 25).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_offscreen_draw_is_a_noop() {
        let mut surface = RasterSurface::new(10, 10).unwrap();
        let dot = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        surface
            .draw_image(&dot, BoundsRect::new(100.0, 100.0, 4.0, 4.0))
            .unwrap();
        assert!(surface.image().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_fill_rect_clips_to_surface() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        surface
            .fill_rect([1, 2, 3, 255], BoundsRect::new(-4.0, -4.0, 8.0, 8.0))
            .unwrap();
        assert_eq!(surface.image().get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(surface.image().get_pixel(3, 3).0, [1, 2, 3, 255]);
        assert_eq!(surface.image().get_pixel(4, 4).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_guard_resets_transform_on_early_exit() {
        let mut surface = RasterSurface::new(8, 8).unwrap();
        fn draw_and_bail(surface: &mut RasterSurface) -> SurfaceResult<()> {
            let mut guard = TransformGuard::new(surface, Transform::new(3.0, 3.0, 4.0));
            guard.fill_rect([255, 255, 255, 255], BoundsRect::new(0.0, 0.0, 1.0, 1.0))?;
            Err(SurfaceError::Draw {
                message: "backend rejected the frame".into(),
            })
        }
        assert!(draw_and_bail(&mut surface).is_err());
        assert_eq!(surface.transform(), Transform::identity());
    }
}
