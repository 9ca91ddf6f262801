//! The owned view context: one constructible, resettable object holding the
//! whole mutable view state, passed to the renderer and the interaction
//! controller. There is no process-wide singleton.

use artmap_core::quadtree::Quadtree;
use artmap_core::transform::{Transform, Viewport};
use artmap_core::types::{AppState, Generation, Point, PointSet};
use artmap_render::bake::{bake_pyramid, BakeError, BakeParams, TilePyramid};
use artmap_render::draw::{render_frame, ActiveLod, FrameReport};
use artmap_render::surface::RenderSurface;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: AppState, to: AppState },

    #[error("entering detail requires a selected point")]
    NoSelection,

    #[error("no point at index {index}")]
    UnknownPoint { index: usize },
}

pub type ViewResult<T> = Result<T, ViewError>;

/// Background color of every rendered frame.
const FRAME_BACKGROUND: [u8; 4] = [18, 18, 20, 255];

/// All mutable view state for one scatter-plot view.
#[derive(Debug)]
pub struct ViewContext {
    state: AppState,
    pub transform: Transform,
    pub viewport: Viewport,
    pub points: PointSet,
    pub quadtree: Option<Quadtree>,
    pub pyramid: Option<TilePyramid>,
    /// Set after a catastrophic surface failure: baking is never retried
    /// and rendering stays dynamic.
    bake_disabled: bool,
    selected: Option<usize>,
    active_lod: ActiveLod,
    status: String,
    redraw_requests: u64,
}

impl ViewContext {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            state: AppState::LoadingData,
            transform: viewport.fit_transform(),
            viewport,
            points: PointSet::new(),
            quadtree: None,
            pyramid: None,
            bake_disabled: false,
            selected: None,
            active_lod: ActiveLod::None,
            status: String::new(),
            redraw_requests: 0,
        }
    }

    /// Back to a fresh context, keeping only the viewport.
    pub fn reset(&mut self) {
        *self = Self::new(self.viewport);
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn active_lod(&self) -> ActiveLod {
        self.active_lod
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn selected_point(&self) -> Option<&Point> {
        self.selected.and_then(|index| self.points.get(index))
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Move to `to`, enforcing the machine
    /// `LoadingData → LoadingImages → CreatingBitmaps → Viewing ⇄ Detail`
    /// (any state may restart at `LoadingData`; a failed load may return
    /// from `LoadingData` to `Viewing`). Each accepted transition requests
    /// exactly one redraw. Leaving `Detail` clears the selection.
    pub fn transition(&mut self, to: AppState) -> ViewResult<()> {
        use AppState::*;
        let allowed = matches!(
            (self.state, to),
            (_, LoadingData)
                | (LoadingData, LoadingImages)
                | (LoadingData, Viewing)
                | (LoadingImages, CreatingBitmaps)
                | (CreatingBitmaps, Viewing)
                | (Viewing, Detail)
                | (Detail, Viewing)
        );
        if !allowed {
            return Err(ViewError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        if to == Detail && self.selected.is_none() {
            return Err(ViewError::NoSelection);
        }
        if self.state == Detail && to != Detail {
            self.selected = None;
        }
        log::debug!("state {} -> {}", self.state, to);
        self.state = to;
        self.request_redraw();
        Ok(())
    }

    /// Select a point and enter the detail state.
    pub fn enter_detail(&mut self, index: usize) -> ViewResult<()> {
        if self.points.get(index).is_none() {
            return Err(ViewError::UnknownPoint { index });
        }
        self.selected = Some(index);
        self.transition(AppState::Detail)
    }

    /// Install a new run's points: the collection is replaced wholesale,
    /// the spatial index rebuilt, and all baked artifacts invalidated.
    pub fn install_run(&mut self, points: Vec<Point>) -> Generation {
        let generation = self.points.replace(points);
        self.quadtree = Quadtree::build(&self.points);
        self.pyramid = None;
        self.selected = None;
        self.transform = self.viewport.fit_transform();
        self.request_redraw();
        generation
    }

    /// Bake the tile pyramid for the current points. A per-cell failure is
    /// already routed around inside the pyramid; only a surface-creation
    /// failure disables baking for good.
    pub fn bake(&mut self, params: &BakeParams) {
        if self.bake_disabled {
            log::debug!("baking disabled; staying dynamic");
            return;
        }
        let Some(tree) = &self.quadtree else {
            self.pyramid = None;
            return;
        };
        match bake_pyramid(&mut self.points, tree, params) {
            Ok(pyramid) => self.pyramid = Some(pyramid),
            Err(err @ BakeError::Surface(_)) => {
                log::error!("{err}; falling back to dynamic rendering permanently");
                self.bake_disabled = true;
                self.pyramid = None;
            }
            Err(err) => {
                log::error!("bake aborted: {err}");
                self.pyramid = None;
            }
        }
    }

    pub fn bake_disabled(&self) -> bool {
        self.bake_disabled
    }

    /// Host resize event.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.request_redraw();
    }

    /// Apply a transform coming out of the gesture throttle or an
    /// animation tick.
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.request_redraw();
    }

    pub fn request_redraw(&mut self) {
        self.redraw_requests += 1;
    }

    /// Redraws requested since the last call; the host drains this and
    /// renders at most once.
    pub fn take_redraw_requests(&mut self) -> u64 {
        std::mem::take(&mut self.redraw_requests)
    }

    /// Redraw entry point for the host. Renders the best available artifact
    /// for the current transform and records which LOD was active for
    /// subsequent hit tests.
    pub fn render<S: RenderSurface>(&mut self, surface: &mut S) -> FrameReport {
        let pyramid = if self.bake_disabled {
            None
        } else {
            self.pyramid.as_ref()
        };
        let report = render_frame(
            surface,
            &self.points,
            pyramid,
            self.transform,
            self.viewport,
            FRAME_BACKGROUND,
        );
        self.active_lod = report.lod;
        self.refresh_status();
        report
    }

    /// Hit-test entry point for the host; see [`crate::hittest::hit_test`].
    pub fn hit_test(&self, click_x: f64, click_y: f64) -> Option<usize> {
        crate::hittest::hit_test(self, click_x, click_y)
    }

    fn refresh_status(&mut self) {
        self.status = match self.state {
            AppState::Viewing => format!(
                "viewing {} points at k={:.2}",
                self.points.len(),
                self.transform.k
            ),
            AppState::Detail => match self.selected_point() {
                Some(point) => format!("detail: {} ({})", point.filename, point.artist),
                None => "detail".to_string(),
            },
            other => other.to_string(),
        };
    }
}
