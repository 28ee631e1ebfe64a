//! Capability interfaces between this crate and the eye tracker.
//!
//! Commands are fire-and-forget: an `Ok` only means the command was issued.
//! Outcomes arrive later through [`CalibrationHandler`] callbacks, on whatever
//! thread the tracker delivers them.

pub mod link;
pub mod simulated;

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::models::{CalibrationPoint, CalibrationResult, RawFrame};

pub use link::{LinkStatus, TrackerLink};
pub use simulated::{
    FrameGenerator, RecordingTarget, ScriptedOutcome, SimulatedTracker, TargetEvent,
    TrackerCommand,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackerState {
    Connected,
    NotConnected,
    BadFirmware,
    NoUsb3,
    NoStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMode {
    /// Frames are pushed to listeners as they are produced.
    Push,
    Pull,
}

pub trait GazeListener: Send + Sync {
    fn on_gaze_update(&self, frame: &RawFrame);
}

pub trait CalibrationHandler: Send + Sync {
    fn on_calibration_started(&self);
    fn on_calibration_progress(&self, progress: f64);
    fn on_calibration_processing(&self);
    fn on_calibration_result(&self, result: CalibrationResult);
}

pub trait TrackerControl: Send + Sync {
    fn tracker_state(&self) -> TrackerState;
    fn activate(&self, mode: ClientMode) -> Result<()>;
    fn deactivate(&self);
    fn is_activated(&self) -> bool;
    fn is_calibrating(&self) -> bool;

    fn add_gaze_listener(&self, listener: Arc<dyn GazeListener>);
    fn remove_gaze_listener(&self, listener: &Arc<dyn GazeListener>);

    fn calibration_start(&self, point_count: usize, handler: Arc<dyn CalibrationHandler>)
        -> Result<()>;
    fn calibration_point_start(&self, x: i32, y: i32) -> Result<()>;
    fn calibration_point_end(&self) -> Result<()>;
    fn calibration_abort(&self) -> Result<()>;
    fn calibration_clear(&self) -> Result<()>;
}

/// The on-screen marker the user fixates while a point is sampled.
pub trait TargetDisplay: Send {
    fn show(&mut self, point: CalibrationPoint);
    fn hide(&mut self);
}

/// Identity comparison for listener trait objects.
pub(crate) fn same_listener(a: &Arc<dyn GazeListener>, b: &Arc<dyn GazeListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
