use anyhow::{bail, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::CalibrationResult,
    settings::CalibrationConfig,
    tracker::{CalibrationHandler, TargetDisplay, TrackerControl},
};

use super::{
    points::{generate_points, GRID_POINT_COUNT},
    scheduler::DeferredScheduler,
    state::{CalibrationSnapshot, CalibrationState, CalibrationStatus},
    task_queue::TaskQueue,
};

/// Work for the session's own tick. Tracker callbacks and timers only ever
/// enqueue these; nothing touches session state off the driver.
///
/// Every task carries the round that produced it and is dropped once the
/// session has moved on to another round.
#[derive(Debug, Clone)]
pub enum SessionTask {
    Started { round: u64 },
    Progress { round: u64, progress: f64 },
    Processing { round: u64 },
    Result { round: u64, result: CalibrationResult },
    ShowNextPoint { round: u64 },
    BeginSample { round: u64 },
    EndSample { round: u64 },
}

/// Handed to the tracker as its calibration handler, bound to one round.
#[derive(Clone)]
pub struct SessionInbox {
    queue: TaskQueue<SessionTask>,
    round: u64,
}

impl CalibrationHandler for SessionInbox {
    fn on_calibration_started(&self) {
        self.queue.enqueue(SessionTask::Started { round: self.round });
    }

    fn on_calibration_progress(&self, progress: f64) {
        self.queue.enqueue(SessionTask::Progress {
            round: self.round,
            progress,
        });
    }

    fn on_calibration_processing(&self) {
        self.queue
            .enqueue(SessionTask::Processing { round: self.round });
    }

    fn on_calibration_result(&self, result: CalibrationResult) {
        self.queue.enqueue(SessionTask::Result {
            round: self.round,
            result,
        });
    }
}

/// Drives one multi-point calibration: shows shuffled grid targets, samples
/// each one through the tracker and retries flagged points within the
/// configured attempt and resample caps.
pub struct CalibrationSession {
    config: CalibrationConfig,
    tracker: Arc<dyn TrackerControl>,
    target: Option<Box<dyn TargetDisplay>>,
    state: CalibrationState,
    tasks: TaskQueue<SessionTask>,
    scheduler: DeferredScheduler<SessionTask>,
    rng: StdRng,
}

impl CalibrationSession {
    /// Must be called from within a tokio runtime.
    pub fn new(config: CalibrationConfig, tracker: Arc<dyn TrackerControl>) -> Result<Self> {
        config.validate()?;
        let tasks = TaskQueue::new();
        let scheduler = DeferredScheduler::new(tasks.clone())?;
        Ok(Self {
            config,
            tracker,
            target: None,
            state: CalibrationState::new(),
            tasks,
            scheduler,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_target(mut self, target: Box<dyn TargetDisplay>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Callback handle for the current round. Handles from earlier rounds keep
    /// working but everything they deliver is ignored.
    pub fn inbox(&self) -> SessionInbox {
        SessionInbox {
            queue: self.tasks.clone(),
            round: self.state.round,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.target.is_none() {
            bail!("calibration target display is not attached");
        }
        self.config.screen.validate()?;
        if !self.tracker.is_activated() {
            bail!("tracker is not activated");
        }
        if self.state.status.is_running() || self.tracker.is_calibrating() {
            bail!("calibration already in progress");
        }
        if self.state.status == CalibrationStatus::Succeeded {
            bail!("calibration already succeeded; reset before recalibrating");
        }

        self.scheduler.cancel_all();
        self.tasks.clear();

        let points = generate_points(&self.config.screen, self.config.buffer_pct, &mut self.rng);
        let session_id = Uuid::new_v4().to_string();
        info!(
            "Calibration {} starting with {} points",
            session_id,
            points.len()
        );
        self.state.begin(session_id, points, Utc::now());

        let handler: Arc<dyn CalibrationHandler> = Arc::new(self.inbox());
        if let Err(err) = self.tracker.calibration_start(GRID_POINT_COUNT, handler) {
            self.state.reset();
            return Err(err.context("tracker refused to start calibration"));
        }
        Ok(())
    }

    /// Runs every queued task. Call once per frame.
    pub fn tick(&mut self) -> usize {
        let tasks = self.tasks.clone();
        tasks.run_pending(|task| self.handle(task))
    }

    /// Returns a finished or running session to `Idle`. A stored calibration
    /// from a successful run is cleared on the tracker.
    pub fn reset(&mut self) {
        if self.state.status.is_running() {
            self.abort("reset requested");
        } else if self.state.status == CalibrationStatus::Succeeded {
            if let Err(err) = self.tracker.calibration_clear() {
                error!("Failed to clear tracker calibration: {err:#}");
            }
        }
        self.scheduler.cancel_all();
        self.tasks.clear();
        self.state.reset();
    }

    pub fn status(&self) -> CalibrationStatus {
        self.state.status
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    pub fn succeeded(&self) -> bool {
        self.state.success
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        self.state.snapshot()
    }

    fn handle(&mut self, task: SessionTask) {
        match task {
            SessionTask::Started { round } => {
                if self.is_current(round, "calibration started") {
                    self.on_started();
                }
            }
            SessionTask::Progress { round, progress } => {
                if self.is_current(round, "progress") {
                    debug!("Calibration point sampled, progress {:.0}%", progress * 100.0);
                    self.state.record_progress(progress);
                }
            }
            SessionTask::Processing { round } => {
                if self.is_current(round, "processing notice") {
                    debug!("Tracker processing calibration samples");
                    self.state.status = CalibrationStatus::Processing;
                }
            }
            SessionTask::Result { round, result } => {
                if self.is_current(round, "calibration result") {
                    self.on_result(result);
                }
            }
            SessionTask::ShowNextPoint { round } => {
                if self.is_current(round, "show next point") {
                    self.show_next_point();
                }
            }
            SessionTask::BeginSample { round } => {
                if self.is_current(round, "begin sample") {
                    self.begin_sample();
                }
            }
            SessionTask::EndSample { round } => {
                if self.is_current(round, "end sample") {
                    self.end_sample();
                }
            }
        }
    }

    fn is_current(&self, round: u64, what: &str) -> bool {
        let current = round == self.state.round && self.state.status.is_running();
        if !current {
            debug!(
                "Ignoring stale {what} from round {round} (now round {}, {})",
                self.state.round,
                self.state.status.as_str()
            );
        }
        current
    }

    fn on_started(&mut self) {
        if self.state.status != CalibrationStatus::GeneratingPoints {
            debug!("Ignoring calibration-started in {}", self.state.status.as_str());
            return;
        }
        info!("Tracker accepted calibration; presenting points");
        self.schedule_next_point();
    }

    fn schedule_next_point(&self) {
        self.scheduler.schedule(
            self.config.switch_delay(),
            SessionTask::ShowNextPoint {
                round: self.state.round,
            },
        );
    }

    fn show_next_point(&mut self) {
        let Some(point) = self.state.next_point() else {
            self.state.status = CalibrationStatus::Processing;
            return;
        };

        if let Some(target) = self.target.as_mut() {
            target.show(point);
        }
        self.state.status = CalibrationStatus::Sampling { point };

        let round = self.state.round;
        self.scheduler
            .schedule(self.config.start_delay(), SessionTask::BeginSample { round });
        self.scheduler
            .schedule(self.config.end_delay(), SessionTask::EndSample { round });
    }

    fn begin_sample(&mut self) {
        let Some(point) = self.state.current else {
            return;
        };
        let (x, y) = point.pixel();
        if let Err(err) = self.tracker.calibration_point_start(x, y) {
            error!("Failed to start sampling at ({x}, {y}): {err:#}");
        }
    }

    fn end_sample(&mut self) {
        if let Err(err) = self.tracker.calibration_point_end() {
            error!("Failed to end point sampling: {err:#}");
        }
        if let Some(target) = self.target.as_mut() {
            target.hide();
        }
        self.state.current = None;

        if self.state.queue.is_empty() {
            self.state.status = CalibrationStatus::Processing;
        } else {
            self.schedule_next_point();
        }
    }

    fn on_result(&mut self, result: CalibrationResult) {
        if result.valid {
            self.scheduler.cancel_all();
            self.state.succeed(Utc::now());
            info!(
                "Calibration valid (average error {:.2} deg) after {} failed attempt(s)",
                result.average_error_deg, self.state.attempts
            );
            return;
        }

        let requeued = self.state.requeue(result.flagged_points());
        self.state.attempts += 1;
        info!(
            "Calibration invalid: {} point(s) to resample, attempt {}/{}",
            requeued, self.state.attempts, self.config.max_attempts
        );

        if self.state.attempts >= self.config.max_attempts {
            self.abort("attempt limit reached");
        } else if self.state.queue.len() >= self.config.max_resample {
            self.abort("resample limit reached");
        } else if requeued == 0 {
            self.abort("tracker rejected calibration without flagging points");
        } else {
            self.state.status = CalibrationStatus::Resampling;
            self.schedule_next_point();
        }
    }

    fn abort(&mut self, reason: &str) {
        warn!(
            "Calibration {} aborted: {reason}",
            self.state.session_id.as_deref().unwrap_or("-")
        );
        self.scheduler.cancel_all();
        if let Err(err) = self.tracker.calibration_abort() {
            error!("Failed to abort tracker calibration: {err:#}");
        }
        if let Some(target) = self.target.as_mut() {
            target.hide();
        }
        self.state.abort(Utc::now());
    }
}
