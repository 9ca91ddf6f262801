use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

use crate::tiles::TileKey;

/// Thumbnail pixel sizes the streaming pipeline requests, smallest first.
/// The first entry is the primary size every point must end up with.
pub const THUMB_SIZES: [u32; 3] = [125, 250, 500];

/// Pixel size of the primary thumbnail, required before baking.
pub const PRIMARY_THUMB_SIZE: u32 = THUMB_SIZES[0];

/// Axis-aligned rectangle. Used both for data-space extents and for
/// pixel-space bounds recorded on points during baking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundsRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_min_max(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    /// Square centered at (cx, cy) with the given edge length.
    pub fn centered_square(cx: f64, cy: f64, edge: f64) -> Self {
        Self {
            x: cx - edge / 2.0,
            y: cy - edge / 2.0,
            width: edge,
            height: edge,
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.max_x() && py >= self.y && py <= self.max_y()
    }

    pub fn intersects(&self, other: &BoundsRect) -> bool {
        self.x <= other.max_x()
            && self.max_x() >= other.x
            && self.y <= other.max_y()
            && self.max_y() >= other.y
    }

    /// Rectangle grown by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + margin * 2.0,
            height: self.height + margin * 2.0,
        }
    }

    /// Rectangle grown by a fraction of its own size on every side.
    pub fn expanded_frac(&self, frac: f64) -> Self {
        Self {
            x: self.x - self.width * frac,
            y: self.y - self.height * frac,
            width: self.width * (1.0 + frac * 2.0),
            height: self.height * (1.0 + frac * 2.0),
        }
    }
}

/// Data-space bounding box of a point collection.
///
/// Degenerate axes (all points sharing one coordinate) are padded so the
/// extent always has positive area and normalization never divides by zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl DataExtent {
    const DEGENERATE_PAD: f64 = 0.5;

    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let mut extent = Self {
            min_x: x0,
            min_y: y0,
            max_x: x0,
            max_y: y0,
        };
        for (x, y) in iter {
            extent.min_x = extent.min_x.min(x);
            extent.min_y = extent.min_y.min(y);
            extent.max_x = extent.max_x.max(x);
            extent.max_y = extent.max_y.max(y);
        }
        if extent.max_x - extent.min_x <= 0.0 {
            extent.min_x -= Self::DEGENERATE_PAD;
            extent.max_x += Self::DEGENERATE_PAD;
        }
        if extent.max_y - extent.min_y <= 0.0 {
            extent.min_y -= Self::DEGENERATE_PAD;
            extent.max_y += Self::DEGENERATE_PAD;
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn bounds(&self) -> BoundsRect {
        BoundsRect::from_min_max(self.min_x, self.min_y, self.max_x, self.max_y)
    }

    /// Normalized position of `x` within the extent, in [0, 1].
    pub fn norm_x(&self, x: f64) -> f64 {
        (x - self.min_x) / self.width()
    }

    /// Normalized position of `y` within the extent, in [0, 1].
    pub fn norm_y(&self, y: f64) -> f64 {
        (y - self.min_y) / self.height()
    }

    /// Data-space rectangle of one normalized sub-rectangle of the extent.
    pub fn sub_rect(&self, norm: &BoundsRect) -> BoundsRect {
        BoundsRect::new(
            self.min_x + norm.x * self.width(),
            self.min_y + norm.y * self.height(),
            norm.width * self.width(),
            norm.height * self.height(),
        )
    }
}

/// Monotonic counter identifying one point-collection lifetime.
///
/// Background work captures the generation it was started for; results are
/// applied only while the generation still matches, so work outlives a
/// dataset swap harmlessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Decoded-image handle owned by a point.
///
/// Cloning is cheap (shared pixel buffer); the same handle is reused as a
/// fallback across sizes when a specific size failed to load.
#[derive(Debug, Clone)]
pub struct ThumbHandle {
    image: Arc<RgbaImage>,
    placeholder: bool,
    label: Option<String>,
}

impl ThumbHandle {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            placeholder: false,
            label: None,
        }
    }

    /// Handle for a synthesized stand-in tile. `label` carries the truncated
    /// filename for hosts that want to overlay it.
    pub fn placeholder(image: RgbaImage, label: String) -> Self {
        Self {
            image: Arc::new(image),
            placeholder: true,
            label: Some(label),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One projected point: a source image placed at (x, y) in data space.
///
/// The size→handle and tile→bounds maps are part of the structure from
/// creation and start empty; they are filled by the streaming pipeline and
/// the tile bakery respectively.
#[derive(Debug, Clone)]
pub struct Point {
    pub filename: String,
    pub artist: String,
    pub x: f64,
    pub y: f64,
    thumbs: HashMap<u32, ThumbHandle>,
    tile_bounds: HashMap<TileKey, BoundsRect>,
}

impl Point {
    pub fn new(filename: String, artist: String, x: f64, y: f64) -> Self {
        Self {
            filename,
            artist,
            x,
            y,
            thumbs: HashMap::new(),
            tile_bounds: HashMap::new(),
        }
    }

    pub fn set_thumb(&mut self, size: u32, handle: ThumbHandle) {
        self.thumbs.insert(size, handle);
    }

    pub fn thumb(&self, size: u32) -> Option<&ThumbHandle> {
        self.thumbs.get(&size)
    }

    pub fn primary_thumb(&self) -> Option<&ThumbHandle> {
        self.thumbs.get(&PRIMARY_THUMB_SIZE)
    }

    /// Exact size if loaded, otherwise the loaded size closest to the
    /// request. Returns the size actually chosen alongside the handle.
    pub fn thumb_or_nearest(&self, size: u32) -> Option<(u32, &ThumbHandle)> {
        if let Some(handle) = self.thumbs.get(&size) {
            return Some((size, handle));
        }
        self.thumbs
            .iter()
            .min_by_key(|(have, _)| have.abs_diff(size))
            .map(|(have, handle)| (*have, handle))
    }

    /// Default every still-unset secondary size slot to the primary handle.
    pub fn hydrate_secondary_sizes(&mut self) {
        let Some(primary) = self.primary_thumb().cloned() else {
            return;
        };
        for size in THUMB_SIZES {
            self.thumbs.entry(size).or_insert_with(|| primary.clone());
        }
    }

    pub fn record_bounds(&mut self, key: TileKey, bounds: BoundsRect) {
        self.tile_bounds.insert(key, bounds);
    }

    pub fn bounds_for(&self, key: &TileKey) -> Option<&BoundsRect> {
        self.tile_bounds.get(key)
    }

    /// The single tile at `depth` this point was baked into, if any.
    pub fn bounds_at_depth(&self, depth: u8) -> Option<(&TileKey, &BoundsRect)> {
        self.tile_bounds.iter().find(|(key, _)| key.depth == depth)
    }

    pub fn clear_tile_bounds(&mut self) {
        self.tile_bounds.clear();
    }

    pub fn squared_distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}

/// A thumbnail produced by the streaming pipeline, addressed back to its
/// point by index so the interaction thread can apply it synchronously.
#[derive(Debug, Clone)]
pub struct LoadedThumb {
    pub index: usize,
    pub size: u32,
    pub handle: ThumbHandle,
}

/// The current point collection. Replaced wholesale per run; individual
/// points are never destroyed.
#[derive(Debug, Default)]
pub struct PointSet {
    points: Vec<Point>,
    generation: Generation,
}

impl PointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new collection, bumping the generation so results from any
    /// still-running work against the old collection are discarded.
    pub fn replace(&mut self, points: Vec<Point>) -> Generation {
        self.points = points;
        self.generation = self.generation.next();
        self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<&Point> {
        self.points.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Point> {
        self.points.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Point> {
        self.points.iter_mut()
    }

    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some((sx / n, sy / n))
    }

    pub fn extent(&self) -> Option<DataExtent> {
        DataExtent::from_points(self.points.iter().map(|p| (p.x, p.y)))
    }

    /// Point indices ordered by squared distance from the centroid,
    /// ascending, so central content resolves first.
    pub fn indices_by_centroid_distance(&self) -> Vec<usize> {
        let Some((cx, cy)) = self.centroid() else {
            return Vec::new();
        };
        let mut indices: Vec<usize> = (0..self.points.len()).collect();
        indices.sort_by(|&a, &b| {
            let da = self.points[a].squared_distance_to(cx, cy);
            let db = self.points[b].squared_distance_to(cx, cy);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        indices
    }

    /// Apply streamed thumbnails, returning false (and dropping them) when
    /// they belong to a superseded generation.
    pub fn apply_thumbs(&mut self, generation: Generation, thumbs: Vec<LoadedThumb>) -> bool {
        if generation != self.generation {
            log::debug!(
                "dropping {} thumbnails from stale generation {}",
                thumbs.len(),
                generation.value()
            );
            return false;
        }
        for thumb in thumbs {
            if let Some(point) = self.points.get_mut(thumb.index) {
                point.set_thumb(thumb.size, thumb.handle);
            }
        }
        for point in &mut self.points {
            point.hydrate_secondary_sizes();
        }
        true
    }
}

/// Top-level view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    LoadingData,
    LoadingImages,
    CreatingBitmaps,
    Viewing,
    Detail,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::LoadingData => write!(f, "loading data"),
            AppState::LoadingImages => write!(f, "loading images"),
            AppState::CreatingBitmaps => write!(f, "creating bitmaps"),
            AppState::Viewing => write!(f, "viewing"),
            AppState::Detail => write!(f, "detail"),
        }
    }
}
