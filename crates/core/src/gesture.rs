//! Touch gesture interpretation
//!
//! Turns raw touch sequences into viewer actions: two-finger pinch zoom,
//! double-tap zoom toggle and horizontal swipe page navigation. State for
//! a gesture lives in an [`ActiveGesture`] that exists from touch-start to
//! touch-end; only the start time of the last single tap survives between
//! gestures so that a double tap can be recognised.

use kurbo::Point;
use std::time::{Duration, Instant};

/// Thresholds for gesture classification
#[derive(Debug, Clone, PartialEq)]
pub struct GestureConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    /// Horizontal travel a swipe must exceed
    pub swipe_min_distance: f64,
    /// Vertical travel a swipe must stay under
    pub swipe_max_off_axis: f64,
    pub swipe_max_duration: Duration,
    pub double_tap_window: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 3.0,
            swipe_min_distance: 50.0,
            swipe_max_off_axis: 50.0,
            swipe_max_duration: Duration::from_millis(300),
            double_tap_window: Duration::from_millis(300),
        }
    }
}

impl GestureConfig {
    fn clamp(&self, scale: f32) -> f32 {
        scale.max(self.min_scale).min(self.max_scale.max(self.min_scale))
    }
}

/// What the viewer should do in response to a touch event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    /// Set the zoom scale
    Zoom(f32),
    PreviousPage,
    NextPage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ActiveGesture {
    Pinch {
        initial_distance: f64,
        initial_scale: f32,
    },
    Track {
        start: Point,
        started_at: Instant,
    },
}

/// Classifies touch sequences
#[derive(Debug, Clone)]
pub struct GestureInterpreter {
    config: GestureConfig,
    enabled: bool,
    active: Option<ActiveGesture>,
    last_tap_start: Option<Instant>,
}

impl GestureInterpreter {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            enabled: true,
            active: None,
            last_tap_start: None,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled interpreters ignore every event
    ///
    /// Used while the placement editor owns pointer input.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.active = None;
            self.last_tap_start = None;
        }
    }

    /// Whether a gesture is between touch-start and touch-end
    pub fn in_gesture(&self) -> bool {
        self.active.is_some()
    }

    /// Handle touch-start with every point currently on the surface
    pub fn touch_start(
        &mut self,
        touches: &[Point],
        now: Instant,
        current_scale: f32,
    ) -> Option<GestureAction> {
        if !self.enabled {
            return None;
        }

        match touches {
            [first, second] => {
                self.active = Some(ActiveGesture::Pinch {
                    initial_distance: first.distance(*second),
                    initial_scale: current_scale,
                });
                None
            }
            [point] => {
                self.active = Some(ActiveGesture::Track {
                    start: *point,
                    started_at: now,
                });

                let window = self.config.double_tap_window;
                let is_double_tap = self
                    .last_tap_start
                    .is_some_and(|previous| now.saturating_duration_since(previous) < window);

                if is_double_tap {
                    self.last_tap_start = None;
                    let target = if current_scale > 1.0 { 1.0 } else { 2.0 };
                    Some(GestureAction::Zoom(self.config.clamp(target)))
                } else {
                    self.last_tap_start = Some(now);
                    None
                }
            }
            _ => {
                self.active = None;
                None
            }
        }
    }

    /// Handle touch-move; pinches emit a zoom on every move
    pub fn touch_move(&mut self, touches: &[Point]) -> Option<GestureAction> {
        if !self.enabled {
            return None;
        }

        match (self.active, touches) {
            (
                Some(ActiveGesture::Pinch {
                    initial_distance,
                    initial_scale,
                }),
                [first, second],
            ) if initial_distance > f64::EPSILON => {
                let ratio = first.distance(*second) / initial_distance;
                let scale = (initial_scale as f64 * ratio) as f32;
                Some(GestureAction::Zoom(self.config.clamp(scale)))
            }
            _ => None,
        }
    }

    /// Handle touch-end
    ///
    /// `released` is the position of the lifted finger. The active gesture
    /// is discarded whatever the outcome.
    pub fn touch_end(&mut self, released: Option<Point>, now: Instant) -> Option<GestureAction> {
        if !self.enabled {
            return None;
        }

        let gesture = self.active.take()?;
        let ActiveGesture::Track { start, started_at } = gesture else {
            return None;
        };
        let end = released?;

        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let elapsed = now.saturating_duration_since(started_at);

        let is_swipe = dx.abs() > self.config.swipe_min_distance
            && dy.abs() < self.config.swipe_max_off_axis
            && elapsed < self.config.swipe_max_duration;
        if !is_swipe {
            return None;
        }

        if dx > 0.0 {
            Some(GestureAction::PreviousPage)
        } else {
            Some(GestureAction::NextPage)
        }
    }
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}
