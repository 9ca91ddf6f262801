//! Artmap View Library
//!
//! The owned view context (state machine, shared transform, point set and
//! pyramid), gesture throttling and animated zoom, hit testing, and the
//! controller that sequences load → stream → bake → view.

pub mod context;
pub mod controller;
pub mod hittest;
pub mod interact;

pub use context::{ViewContext, ViewError};
pub use controller::{
    apply_action, close_detail, execute_run, open_detail, run_pipeline, ControllerError,
    DetailView,
};
pub use hittest::{hit_test, HIT_TOLERANCE_PX};
pub use interact::{
    ease_in_out_cubic, target_for_action, Action, Animator, Throttle, ZoomAnimation,
    FRAME_INTERVAL, ZOOM_ANIMATION_DURATION, ZOOM_STEP,
};
