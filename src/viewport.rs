//! Zoom as a pure presentation transform: scale the rendered surface and
//! keep the point under the viewport center where it was.

use tracing::debug;

use crate::config::Config;
use crate::surface::RenderSurface;
use crate::types::{Point, ScrollBehavior};

/// Current zoom scale plus the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    /// Scale now applied.
    current: f64,
    /// Scale before the last change.
    previous: f64,
}

impl ZoomState {
    pub fn new(initial: f64) -> Self {
        return Self {
            current: initial,
            previous: initial,
        };
    }

    pub fn current(&self) -> f64 {
        return self.current;
    }

    pub fn previous(&self) -> f64 {
        return self.previous;
    }

    /// Record a new scale. Returns `false` if it equals the current one.
    pub fn set(&mut self, scale: f64) -> bool {
        if (scale - self.current).abs() < f64::EPSILON {
            return false;
        }
        self.previous = self.current;
        self.current = scale;
        return true;
    }
}

/// Width that keeps scaled content filling its container.
pub fn compensating_width_percent(scale: f64) -> f64 {
    return 100.0 / scale;
}

/// Scale the surface to `new_scale` (clamped to the configured bounds) and
/// scroll so the document point at the viewport center stays centered.
/// Never touches markup. Returns whether the scale changed.
pub fn apply_zoom<S: RenderSurface + ?Sized>(surface: &mut S, zoom: &mut ZoomState, new_scale: f64, config: &Config) -> bool {
    let old_scale = zoom.current();
    let new_scale = config.clamp_zoom(new_scale);
    if !zoom.set(new_scale) {
        return false;
    }

    let viewport = surface.viewport();
    let center_x = (viewport.scroll_x + viewport.width / 2.0) / old_scale;
    let center_y = (viewport.scroll_y + viewport.height / 2.0) / old_scale;

    surface.set_transform(new_scale, compensating_width_percent(new_scale));
    let target = Point {
        x: center_x * new_scale - viewport.width / 2.0,
        y: center_y * new_scale - viewport.height / 2.0,
    };
    surface.scroll_to(target, ScrollBehavior::Instant);
    debug!(from = old_scale, to = new_scale, center_x, center_y, "zoom applied");
    return true;
}

pub fn zoom_in_scale(current: f64, config: &Config) -> f64 {
    return config.clamp_zoom(current + config.zoom_step);
}

pub fn zoom_out_scale(current: f64, config: &Config) -> f64 {
    return config.clamp_zoom(current - config.zoom_step);
}
