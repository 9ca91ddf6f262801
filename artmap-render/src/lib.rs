//! Artmap Rendering Library
//!
//! Offscreen rendering surface, the quadtree tile bakery producing the
//! multi-resolution bitmap pyramid, and the zoom-driven LOD renderer.

pub mod bake;
pub mod draw;
pub mod lod;
pub mod surface;

pub use bake::{bake_pyramid, BakeError, BakeParams, TileArtifact, TilePyramid, TileSlot};
pub use draw::{render_frame, ActiveLod, FrameReport};
pub use lod::{band_for_scale, bucket_for_scale, quadrant_for, target_depth, LodBand, SizeBucket};
pub use surface::{RasterSurface, RenderSurface, SurfaceError, TransformGuard};
