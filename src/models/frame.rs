use serde::{Deserialize, Serialize};
use std::ops::BitOr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const ZERO: Point2D = Point2D { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Trackers report a missing coordinate as zero on either axis.
    /// Non-finite values are treated the same way.
    pub fn is_sentinel(&self) -> bool {
        self.x == 0.0 || self.y == 0.0 || !self.x.is_finite() || !self.y.is_finite()
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    pub fn midpoint(&self, other: &Point2D) -> Point2D {
        Point2D::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Tracker status bits attached to every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingState(u8);

impl TrackingState {
    pub const GAZE: TrackingState = TrackingState(0x01);
    pub const EYES: TrackingState = TrackingState(0x02);
    pub const PRESENCE: TrackingState = TrackingState(0x04);
    pub const FAIL: TrackingState = TrackingState(0x08);
    pub const LOST: TrackingState = TrackingState(0x10);

    /// Gaze, eyes and presence all tracked.
    pub const OK: TrackingState = TrackingState(0x07);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: TrackingState) -> bool {
        self.0 & other.0 == other.0
    }

    /// Eye positions can be trusted only when the tracker reports neither failure nor loss.
    pub fn eyes_reliable(self) -> bool {
        !self.contains(Self::FAIL) && !self.contains(Self::LOST)
    }
}

impl BitOr for TrackingState {
    type Output = TrackingState;

    fn bitor(self, rhs: TrackingState) -> TrackingState {
        TrackingState(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeSample {
    /// Pupil center, normalised to the tracker camera frame.
    pub pupil_center: Point2D,
    pub pupil_size: f64,
}

impl EyeSample {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            pupil_center: Point2D::new(x, y),
            pupil_size: 0.0,
        }
    }
}

/// One sample as delivered by the tracker, possibly invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    pub timestamp_ms: u64,
    pub state: TrackingState,
    pub left_eye: Option<EyeSample>,
    pub right_eye: Option<EyeSample>,
    /// Gaze point in screen pixels.
    pub raw: Point2D,
    pub smoothed: Point2D,
}

impl RawFrame {
    pub fn valid_left_eye(&self) -> Option<Point2D> {
        self.valid_eye(self.left_eye)
    }

    pub fn valid_right_eye(&self) -> Option<Point2D> {
        self.valid_eye(self.right_eye)
    }

    /// Gaze coordinates only require a non-sentinel raw point; the tracking
    /// state is not consulted.
    pub fn valid_coordinates(&self) -> Option<(Point2D, Point2D)> {
        if self.raw.is_sentinel() {
            None
        } else {
            Some((self.raw, self.smoothed))
        }
    }

    fn valid_eye(&self, eye: Option<EyeSample>) -> Option<Point2D> {
        if !self.state.eyes_reliable() {
            return None;
        }
        eye.map(|sample| sample.pupil_center)
            .filter(|center| !center.is_sentinel())
    }
}
