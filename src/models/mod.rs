pub mod calibration;
pub mod frame;

pub use calibration::{CalibrationPoint, CalibrationResult, PointResult, PointState};
pub use frame::{EyeSample, Point2D, RawFrame, TrackingState};
