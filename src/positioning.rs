//! Conversions from validated gaze state into screen, window and viewport space.
//!
//! Tracker gaze points are screen pixels with a top-left origin. Window
//! coordinates use a bottom-left origin, viewport coordinates span `[0, 1]`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::models::Point2D;
use crate::validator::ValidatedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

impl ScreenGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("screen geometry must be non-zero (got {}x{})", self.width, self.height);
        }
        Ok(())
    }

    pub fn width_f(&self) -> f64 {
        f64::from(self.width)
    }

    pub fn height_f(&self) -> f64 {
        f64::from(self.height)
    }

    pub fn gaze_to_window(&self, gaze: Point2D) -> Point2D {
        Point2D::new(gaze.x, self.height_f() - gaze.y)
    }

    pub fn window_to_viewport(&self, window: Point2D) -> Point2D {
        Point2D::new(window.x / self.width_f(), window.y / self.height_f())
    }

    /// Scale a camera-normalised point (pupil centers) to screen pixels.
    pub fn normalized_to_screen(&self, normalized: Point2D) -> Point2D {
        Point2D::new(normalized.x * self.width_f(), normalized.y * self.height_f())
    }
}

/// Viewport rectangle a positioned object must stay inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for ViewportBounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
        }
    }
}

impl ViewportBounds {
    pub fn clamp(&self, point: Point2D) -> Point2D {
        Point2D::new(
            point.x.clamp(self.min_x, self.max_x),
            point.y.clamp(self.min_y, self.max_y),
        )
    }
}

/// Viewport position for a gaze-driven object. `None` means "do not move yet".
pub fn gaze_viewport_position(
    state: &ValidatedState,
    screen: &ScreenGeometry,
    bounds: &ViewportBounds,
) -> Option<Point2D> {
    let gaze = state.smoothed_gaze?;
    let viewport = screen.window_to_viewport(screen.gaze_to_window(gaze));
    Some(bounds.clamp(viewport))
}

/// Placement of the two eye markers shown outside of calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeOverlay {
    pub left: Option<Point2D>,
    pub right: Option<Point2D>,
    pub scale: f64,
    pub rotation_deg: f64,
}

impl EyeOverlay {
    /// Returns `None` while calibrating or before both eyes have been seen.
    pub fn compute(
        state: &ValidatedState,
        screen: &ScreenGeometry,
        calibrating: bool,
        distance_modifier: f64,
    ) -> Option<Self> {
        if calibrating {
            return None;
        }
        state.user_midpoint?;

        Some(Self {
            left: state.left_eye.map(|eye| screen.normalized_to_screen(eye)),
            right: state.right_eye.map(|eye| screen.normalized_to_screen(eye)),
            scale: state.eye_distance_scale.unwrap_or(0.0) * distance_modifier,
            rotation_deg: state.eye_tilt_degrees.unwrap_or(0.0),
        })
    }
}
