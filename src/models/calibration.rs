use serde::{Deserialize, Serialize};

use super::Point2D;

/// A calibration target in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub x: f64,
    pub y: f64,
}

impl CalibrationPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Tracker commands take whole pixels.
    pub fn pixel(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

impl From<Point2D> for CalibrationPoint {
    fn from(point: Point2D) -> Self {
        Self::new(point.x, point.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointState {
    NoData,
    Resample,
    Ok,
}

impl PointState {
    pub fn needs_resample(self) -> bool {
        matches!(self, PointState::NoData | PointState::Resample)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointResult {
    pub state: PointState,
    pub coordinates: Point2D,
    /// Mean accuracy at this point in degrees, when the tracker reports one.
    pub accuracy_deg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResult {
    pub valid: bool,
    pub points: Vec<PointResult>,
    pub average_error_deg: f64,
}

impl CalibrationResult {
    /// Points the tracker wants sampled again.
    pub fn flagged_points(&self) -> impl Iterator<Item = CalibrationPoint> + '_ {
        self.points
            .iter()
            .filter(|point| point.state.needs_resample())
            .map(|point| CalibrationPoint::from(point.coordinates))
    }
}
