//! In-process tracker used by the demo runner and the tests.
//!
//! Calibration callbacks are delivered synchronously from inside the command
//! that triggers them, after the tracker's own lock has been released.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::{
    CalibrationPoint, CalibrationResult, EyeSample, Point2D, PointResult, PointState, RawFrame,
    TrackingState,
};
use crate::positioning::ScreenGeometry;

use super::{
    same_listener, CalibrationHandler, ClientMode, GazeListener, TargetDisplay, TrackerControl,
    TrackerState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// What the simulated tracker reports once every point of a round has been sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Valid,
    /// Invalid result with the first `flagged` sampled points marked for resampling.
    Invalid { flagged: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCommand {
    Activate,
    Deactivate,
    CalibrationStart(usize),
    PointStart(i32, i32),
    PointEnd,
    Abort,
    Clear,
}

enum Callback {
    Started,
    Progress(f64),
    Finished(CalibrationResult),
}

struct SimState {
    tracker_state: TrackerState,
    activated: bool,
    calibrating: bool,
    listeners: Vec<Arc<dyn GazeListener>>,
    handler: Option<Arc<dyn CalibrationHandler>>,
    script: VecDeque<ScriptedOutcome>,
    round_total: usize,
    round_points: Vec<Point2D>,
    open_point: Option<Point2D>,
    commands: Vec<TrackerCommand>,
}

pub struct SimulatedTracker {
    inner: Mutex<SimState>,
}

impl SimulatedTracker {
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            inner: Mutex::new(SimState {
                tracker_state: TrackerState::Connected,
                activated: false,
                calibrating: false,
                listeners: Vec::new(),
                handler: None,
                script: outcomes.into(),
                round_total: 0,
                round_points: Vec::new(),
                open_point: None,
                commands: Vec::new(),
            }),
        }
    }

    pub fn set_tracker_state(&self, state: TrackerState) {
        self.lock().tracker_state = state;
    }

    pub fn push_outcome(&self, outcome: ScriptedOutcome) {
        self.lock().script.push_back(outcome);
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<TrackerCommand> {
        self.lock().commands.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Deliver one frame to every registered listener.
    pub fn push_frame(&self, frame: RawFrame) {
        let listeners = self.lock().listeners.clone();
        for listener in listeners {
            listener.on_gaze_update(&frame);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(handler: Option<Arc<dyn CalibrationHandler>>, callbacks: Vec<Callback>) {
        let Some(handler) = handler else {
            return;
        };
        for callback in callbacks {
            match callback {
                Callback::Started => handler.on_calibration_started(),
                Callback::Progress(progress) => handler.on_calibration_progress(progress),
                Callback::Finished(result) => {
                    handler.on_calibration_processing();
                    handler.on_calibration_result(result);
                }
            }
        }
    }
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimState {
    fn finish_round(&mut self) -> CalibrationResult {
        let outcome = self.script.pop_front().unwrap_or(ScriptedOutcome::Valid);
        let flagged = match outcome {
            ScriptedOutcome::Valid => 0,
            ScriptedOutcome::Invalid { flagged } => flagged.min(self.round_points.len()),
        };

        let points = self
            .round_points
            .drain(..)
            .enumerate()
            .map(|(index, coordinates)| PointResult {
                state: if index < flagged {
                    PointState::Resample
                } else {
                    PointState::Ok
                },
                coordinates,
                accuracy_deg: (index >= flagged).then_some(0.5),
            })
            .collect();

        let valid = outcome == ScriptedOutcome::Valid;
        if valid {
            self.calibrating = false;
        } else {
            self.round_total = flagged;
        }

        log_info!("Simulated calibration round finished: {outcome:?}");

        CalibrationResult {
            valid,
            points,
            average_error_deg: if valid { 0.5 } else { 2.0 },
        }
    }
}

impl TrackerControl for SimulatedTracker {
    fn tracker_state(&self) -> TrackerState {
        self.lock().tracker_state
    }

    fn activate(&self, _mode: ClientMode) -> Result<()> {
        let mut state = self.lock();
        if state.tracker_state != TrackerState::Connected {
            log_warn!("Refusing activation while {:?}", state.tracker_state);
            bail!("tracker not connected ({:?})", state.tracker_state);
        }
        state.commands.push(TrackerCommand::Activate);
        state.activated = true;
        Ok(())
    }

    fn deactivate(&self) {
        let mut state = self.lock();
        state.commands.push(TrackerCommand::Deactivate);
        state.activated = false;
        state.calibrating = false;
    }

    fn is_activated(&self) -> bool {
        self.lock().activated
    }

    fn is_calibrating(&self) -> bool {
        self.lock().calibrating
    }

    fn add_gaze_listener(&self, listener: Arc<dyn GazeListener>) {
        self.lock().listeners.push(listener);
    }

    fn remove_gaze_listener(&self, listener: &Arc<dyn GazeListener>) {
        self.lock()
            .listeners
            .retain(|existing| !same_listener(existing, listener));
    }

    fn calibration_start(
        &self,
        point_count: usize,
        handler: Arc<dyn CalibrationHandler>,
    ) -> Result<()> {
        {
            let mut state = self.lock();
            if !state.activated {
                bail!("tracker not activated");
            }
            if state.calibrating {
                bail!("tracker already calibrating");
            }
            state.commands.push(TrackerCommand::CalibrationStart(point_count));
            state.calibrating = true;
            state.round_total = point_count;
            state.round_points.clear();
            state.open_point = None;
            state.handler = Some(Arc::clone(&handler));
        }

        Self::deliver(Some(handler), vec![Callback::Started]);
        Ok(())
    }

    fn calibration_point_start(&self, x: i32, y: i32) -> Result<()> {
        let mut state = self.lock();
        if !state.calibrating {
            bail!("point start outside of calibration");
        }
        state.commands.push(TrackerCommand::PointStart(x, y));
        state.open_point = Some(Point2D::new(f64::from(x), f64::from(y)));
        log_debug!("Sampling point ({x}, {y})");
        Ok(())
    }

    fn calibration_point_end(&self) -> Result<()> {
        let (handler, callbacks) = {
            let mut state = self.lock();
            let Some(point) = state.open_point.take() else {
                bail!("point end without an open point");
            };
            state.commands.push(TrackerCommand::PointEnd);
            state.round_points.push(point);

            let sampled = state.round_points.len();
            let total = state.round_total.max(1);
            let mut callbacks = vec![Callback::Progress(sampled as f64 / total as f64)];
            if sampled >= state.round_total {
                callbacks.push(Callback::Finished(state.finish_round()));
            }
            (state.handler.clone(), callbacks)
        };

        Self::deliver(handler, callbacks);
        Ok(())
    }

    fn calibration_abort(&self) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(TrackerCommand::Abort);
        state.calibrating = false;
        state.round_points.clear();
        state.open_point = None;
        state.handler = None;
        Ok(())
    }

    fn calibration_clear(&self) -> Result<()> {
        let mut state = self.lock();
        state.commands.push(TrackerCommand::Clear);
        state.calibrating = false;
        state.round_points.clear();
        state.open_point = None;
        state.handler = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetEvent {
    Shown(CalibrationPoint),
    Hidden,
}

/// Target display that records what it was asked to draw.
#[derive(Debug, Clone, Default)]
pub struct RecordingTarget {
    events: Arc<Mutex<Vec<TargetEvent>>>,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TargetEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn shown_points(&self) -> Vec<CalibrationPoint> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TargetEvent::Shown(point) => Some(point),
                TargetEvent::Hidden => None,
            })
            .collect()
    }

    fn record(&self, event: TargetEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl TargetDisplay for RecordingTarget {
    fn show(&mut self, point: CalibrationPoint) {
        log_debug!("Target shown at ({:.0}, {:.0})", point.x, point.y);
        self.record(TargetEvent::Shown(point));
    }

    fn hide(&mut self) {
        self.record(TargetEvent::Hidden);
    }
}

/// Produces a noisy frame stream: a user sitting roughly centered, with
/// jitter and a configurable share of dropped frames.
pub struct FrameGenerator {
    rng: StdRng,
    screen: ScreenGeometry,
    dropout: f64,
    timestamp_ms: u64,
    gaze: Point2D,
}

impl FrameGenerator {
    pub const FRAME_INTERVAL_MS: u64 = 33;

    /// `dropout` is the share of frames reported as lost. Values outside `[0, 1]`
    /// are clamped and a non-finite value disables dropout.
    pub fn new(screen: ScreenGeometry, dropout: f64, seed: Option<u64>) -> Self {
        let dropout = if dropout.is_finite() {
            dropout.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            screen,
            dropout,
            timestamp_ms: 0,
            gaze: Point2D::new(screen.width_f() / 2.0, screen.height_f() / 2.0),
        }
    }

    pub fn next_frame(&mut self) -> RawFrame {
        self.timestamp_ms += Self::FRAME_INTERVAL_MS;

        if self.rng.gen_bool(self.dropout) {
            return RawFrame {
                timestamp_ms: self.timestamp_ms,
                state: TrackingState::LOST,
                ..Default::default()
            };
        }

        let jitter = 0.004;
        let center_x = 0.5 + self.rng.gen_range(-jitter..jitter);
        let center_y = 0.5 + self.rng.gen_range(-jitter..jitter);
        let half_distance = 0.09 + self.rng.gen_range(-jitter..jitter);
        let tilt = self.rng.gen_range(-jitter..jitter);

        let step = 12.0;
        self.gaze = Point2D::new(
            (self.gaze.x + self.rng.gen_range(-step..step)).clamp(1.0, self.screen.width_f()),
            (self.gaze.y + self.rng.gen_range(-step..step)).clamp(1.0, self.screen.height_f()),
        );

        RawFrame {
            timestamp_ms: self.timestamp_ms,
            state: TrackingState::OK,
            left_eye: Some(EyeSample {
                pupil_center: Point2D::new(center_x - half_distance, center_y - tilt),
                pupil_size: 22.0,
            }),
            right_eye: Some(EyeSample {
                pupil_center: Point2D::new(center_x + half_distance, center_y + tilt),
                pupil_size: 22.0,
            }),
            raw: self.gaze,
            smoothed: self.gaze,
        }
    }
}
