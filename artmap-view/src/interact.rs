//! Gesture throttling, animated zoom, and keyboard actions.

use std::time::{Duration, Instant};

use artmap_core::transform::{Transform, Viewport};

/// Minimum interval between applied gesture transforms (~60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Duration of programmatic zoom animations.
pub const ZOOM_ANIMATION_DURATION: Duration = Duration::from_millis(350);

/// Multiplicative step for zoom-in/zoom-out actions.
pub const ZOOM_STEP: f64 = 1.5;

/// Bounds redraw frequency under fast continuous input: a transform is
/// applied at most once per interval, with the latest pending value applied
/// on the next allowed tick or at gesture end, whichever comes first.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_applied: Option<Instant>,
    pending: Option<Transform>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_applied: None,
            pending: None,
        }
    }

    fn due(&self, now: Instant) -> bool {
        self.last_applied
            .map(|last| now.duration_since(last) >= self.interval)
            .unwrap_or(true)
    }

    /// Offer a gesture update. Returns the transform to apply now, or None
    /// if it was deferred as pending.
    pub fn submit(&mut self, transform: Transform, now: Instant) -> Option<Transform> {
        if self.due(now) {
            self.last_applied = Some(now);
            self.pending = None;
            Some(transform)
        } else {
            self.pending = Some(transform);
            None
        }
    }

    /// Release a deferred update once the interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> Option<Transform> {
        if self.pending.is_some() && self.due(now) {
            self.last_applied = Some(now);
            return self.pending.take();
        }
        None
    }

    /// Gesture ended: the final state is never dropped.
    pub fn flush(&mut self) -> Option<Transform> {
        self.pending.take()
    }
}

/// Cubic ease-in-out over [0, 1].
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        let u = -2.0 * t + 2.0;
        1.0 - u * u * u / 2.0
    }
}

/// One eased transform animation with an exactly-once final application.
#[derive(Debug)]
pub struct ZoomAnimation {
    from: Transform,
    to: Transform,
    started: Instant,
    duration: Duration,
    finished: bool,
}

impl ZoomAnimation {
    pub fn new(from: Transform, to: Transform, now: Instant, duration: Duration) -> Self {
        Self {
            from,
            to,
            started: now,
            duration,
            finished: false,
        }
    }

    pub fn target(&self) -> Transform {
        self.to
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Eased transform for `now`. Past the deadline the exact target is
    /// returned once and the animation is finished; later calls yield None.
    pub fn sample(&mut self, now: Instant) -> Option<Transform> {
        if self.finished {
            return None;
        }
        let elapsed = now.duration_since(self.started);
        if elapsed >= self.duration {
            self.finished = true;
            return Some(self.to);
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        Some(Transform::lerp(&self.from, &self.to, ease_in_out_cubic(t)))
    }
}

/// Holds at most one running animation; the host pumps `tick` at its own
/// cadence (a deferred cooperative continuation, scheduled at the host's
/// discretion).
#[derive(Debug, Default)]
pub struct Animator {
    current: Option<ZoomAnimation>,
}

impl Animator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start animating toward `to`, replacing any running animation.
    pub fn animate_to(&mut self, from: Transform, to: Transform, now: Instant) {
        self.current = Some(ZoomAnimation::new(from, to, now, ZOOM_ANIMATION_DURATION));
    }

    pub fn is_animating(&self) -> bool {
        self.current.is_some()
    }

    /// Next transform to apply, if the animation produced one. The final
    /// target is delivered exactly once, after which the animator is idle.
    pub fn tick(&mut self, now: Instant) -> Option<Transform> {
        let animation = self.current.as_mut()?;
        let sampled = animation.sample(now);
        if animation.is_finished() {
            self.current = None;
        }
        sampled
    }
}

/// Keyboard-driven view actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ZoomFit,
    ZoomActual,
    ZoomIn,
    ZoomOut,
    ExitDetail,
}

impl Action {
    /// Map a host key name to an action.
    pub fn from_key(key: &str) -> Option<Action> {
        match key {
            "0" => Some(Action::ZoomFit),
            "1" => Some(Action::ZoomActual),
            "+" | "=" => Some(Action::ZoomIn),
            "-" | "_" => Some(Action::ZoomOut),
            "Escape" => Some(Action::ExitDetail),
            _ => None,
        }
    }
}

/// Target transform for a zoom action, anchored at the viewport center for
/// the multiplicative steps. `ExitDetail` has no transform target.
pub fn target_for_action(
    action: Action,
    current: &Transform,
    viewport: &Viewport,
) -> Option<Transform> {
    let (cx, cy) = viewport.center();
    match action {
        Action::ZoomFit => Some(viewport.fit_transform()),
        Action::ZoomActual => Some(viewport.actual_size_transform()),
        Action::ZoomIn => Some(current.zoom_about(cx, cy, ZOOM_STEP)),
        Action::ZoomOut => Some(current.zoom_about(cx, cy, 1.0 / ZOOM_STEP)),
        Action::ExitDetail => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(k: f64) -> Transform {
        Transform::new(k * 10.0, -k * 5.0, k)
    }

    #[test]
    fn test_throttle_applies_first_then_defers() {
        let mut throttle = Throttle::new(Duration::from_millis(16));
        let start = Instant::now();

        assert_eq!(throttle.submit(t(1.0), start), Some(t(1.0)));
        // Two quick follow-ups: both deferred, only the latest is pending.
        assert_eq!(throttle.submit(t(2.0), start + Duration::from_millis(4)), None);
        assert_eq!(throttle.submit(t(3.0), start + Duration::from_millis(8)), None);

        // Next allowed tick releases the latest pending state.
        assert_eq!(throttle.tick(start + Duration::from_millis(10)), None);
        assert_eq!(
            throttle.tick(start + Duration::from_millis(17)),
            Some(t(3.0))
        );
        assert_eq!(throttle.tick(start + Duration::from_millis(40)), None);
    }

    #[test]
    fn test_gesture_end_flushes_pending_state() {
        let mut throttle = Throttle::new(Duration::from_millis(16));
        let start = Instant::now();
        throttle.submit(t(1.0), start);
        throttle.submit(t(2.0), start + Duration::from_millis(2));

        assert_eq!(throttle.flush(), Some(t(2.0)));
        assert_eq!(throttle.flush(), None);
    }

    #[test]
    fn test_easing_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-12);
        // Slow start: well under linear at t=0.25.
        assert!(ease_in_out_cubic(0.25) < 0.25);
    }

    #[test]
    fn test_animation_final_value_applies_exactly_once() {
        let start = Instant::now();
        let mut animator = Animator::new();
        animator.animate_to(t(1.0), t(4.0), start);

        let mid = animator.tick(start + ZOOM_ANIMATION_DURATION / 2).unwrap();
        assert!(mid.k > 1.0 && mid.k < 4.0);

        let done = animator
            .tick(start + ZOOM_ANIMATION_DURATION + Duration::from_millis(5))
            .unwrap();
        assert_eq!(done, t(4.0));
        assert!(!animator.is_animating());
        assert_eq!(
            animator.tick(start + ZOOM_ANIMATION_DURATION * 2),
            None
        );
    }

    #[test]
    fn test_late_pump_still_lands_on_target() {
        // Host stopped pumping during the animation; the first tick after
        // the deadline applies the exact target.
        let start = Instant::now();
        let mut animation = ZoomAnimation::new(t(1.0), t(2.0), start, Duration::from_millis(100));
        let late = animation.sample(start + Duration::from_secs(5)).unwrap();
        assert_eq!(late, t(2.0));
        assert!(animation.is_finished());
        assert_eq!(animation.sample(start + Duration::from_secs(6)), None);
    }

    #[test]
    fn test_key_bindings() {
        assert_eq!(Action::from_key("0"), Some(Action::ZoomFit));
        assert_eq!(Action::from_key("1"), Some(Action::ZoomActual));
        assert_eq!(Action::from_key("+"), Some(Action::ZoomIn));
        assert_eq!(Action::from_key("-"), Some(Action::ZoomOut));
        assert_eq!(Action::from_key("Escape"), Some(Action::ExitDetail));
        assert_eq!(Action::from_key("x"), None);
    }

    #[test]
    fn test_zoom_actions_scale_about_viewport_center() {
        let viewport = Viewport::new(800.0, 600.0);
        let current = Transform::new(10.0, 20.0, 2.0);

        let zoomed = target_for_action(Action::ZoomIn, &current, &viewport).unwrap();
        assert!((zoomed.k - 3.0).abs() < 1e-12);

        let back = target_for_action(Action::ZoomOut, &zoomed, &viewport).unwrap();
        assert!((back.k - 2.0).abs() < 1e-12);

        let fit = target_for_action(Action::ZoomFit, &current, &viewport).unwrap();
        assert_eq!(fit, viewport.fit_transform());
    }
}
