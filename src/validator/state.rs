use anyhow::{bail, Result};
use serde::Serialize;

use crate::models::Point2D;

/// Latest known-good derived values. A field stays `None` until the first
/// qualifying frame and is never cleared afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedState {
    pub left_eye: Option<Point2D>,
    pub right_eye: Option<Point2D>,
    pub user_midpoint: Option<Point2D>,
    pub raw_gaze: Option<Point2D>,
    pub smoothed_gaze: Option<Point2D>,
    pub eye_distance_scale: Option<f64>,
    pub eye_tilt_degrees: Option<f64>,
}

impl ValidatedState {
    pub fn has_eyes(&self) -> bool {
        self.left_eye.is_some() && self.right_eye.is_some()
    }
}

/// Running extent of observed inter-eye distances. Only ever grows, so `max`
/// never drops below the configured initial maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceRange {
    min: f64,
    max: f64,
}

impl DistanceRange {
    pub fn new(initial_min: f64, initial_max: f64) -> Result<Self> {
        if !initial_min.is_finite() || !initial_max.is_finite() || initial_min >= initial_max {
            bail!("invalid eye distance range {initial_min}..{initial_max}");
        }
        Ok(Self {
            min: initial_min,
            max: initial_max,
        })
    }

    pub fn observe(&mut self, distance: f64) {
        if distance < self.min {
            self.min = distance;
        }
        if distance > self.max {
            self.max = distance;
        }
    }

    /// Scale of `distance` against the largest distance seen so far. In `(0, 1]`
    /// for any positive distance that has been observed.
    pub fn normalize(&self, distance: f64) -> f64 {
        distance / self.max
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_only_expands() -> Result<()> {
        let mut range = DistanceRange::new(0.1, 0.3)?;
        range.observe(0.2);
        assert_eq!((range.min(), range.max()), (0.1, 0.3));
        range.observe(0.05);
        range.observe(0.4);
        assert_eq!((range.min(), range.max()), (0.05, 0.4));
        range.observe(0.2);
        assert_eq!((range.min(), range.max()), (0.05, 0.4));
        Ok(())
    }

    #[test]
    fn scale_stays_positive_at_the_running_minimum() -> Result<()> {
        let mut range = DistanceRange::new(0.1, 0.3)?;
        for distance in [0.04, 0.06, 0.1, 0.2, 0.04] {
            range.observe(distance);
            let scale = range.normalize(distance);
            assert!(scale > 0.0 && scale <= 1.0, "scale {scale} for {distance}");
        }
        assert_eq!(range.min(), 0.04);

        range.observe(0.5);
        assert_eq!(range.normalize(0.5), 1.0);
        Ok(())
    }

    #[test]
    fn degenerate_range_is_rejected() {
        assert!(DistanceRange::new(0.3, 0.3).is_err());
        assert!(DistanceRange::new(0.3, 0.1).is_err());
        assert!(DistanceRange::new(f64::NAN, 0.1).is_err());
    }
}
