use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::models::CalibrationPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum CalibrationStatus {
    Idle,
    GeneratingPoints,
    Sampling { point: CalibrationPoint },
    Resampling,
    Processing,
    Succeeded,
    Aborted,
}

impl Default for CalibrationStatus {
    fn default() -> Self {
        CalibrationStatus::Idle
    }
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationStatus::Idle => "idle",
            CalibrationStatus::GeneratingPoints => "generatingPoints",
            CalibrationStatus::Sampling { .. } => "sampling",
            CalibrationStatus::Resampling => "resampling",
            CalibrationStatus::Processing => "processing",
            CalibrationStatus::Succeeded => "succeeded",
            CalibrationStatus::Aborted => "aborted",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            CalibrationStatus::GeneratingPoints
                | CalibrationStatus::Sampling { .. }
                | CalibrationStatus::Resampling
                | CalibrationStatus::Processing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CalibrationStatus::Succeeded | CalibrationStatus::Aborted)
    }
}

/// Mutable state of one calibration session.
#[derive(Debug, Clone, Default)]
pub struct CalibrationState {
    pub status: CalibrationStatus,
    pub session_id: Option<String>,
    pub queue: VecDeque<CalibrationPoint>,
    pub current: Option<CalibrationPoint>,
    pub attempts: u32,
    /// Points re-queued across all invalid results of this session.
    pub resamples: usize,
    pub success: bool,
    /// Gates the trigger UI while a session runs.
    pub busy: bool,
    pub progress: f64,
    /// Every progress value the tracker reported this run, in delivery order.
    pub progress_history: Vec<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Bumped whenever deferred work from earlier rounds must be ignored.
    pub round: u64,
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(
        &mut self,
        session_id: String,
        points: Vec<CalibrationPoint>,
        started_at: DateTime<Utc>,
    ) {
        *self = Self {
            status: CalibrationStatus::GeneratingPoints,
            session_id: Some(session_id),
            queue: points.into(),
            current: None,
            attempts: 0,
            resamples: 0,
            success: false,
            busy: true,
            progress: 0.0,
            progress_history: Vec::new(),
            started_at: Some(started_at),
            finished_at: None,
            round: self.round + 1,
        };
    }

    pub fn next_point(&mut self) -> Option<CalibrationPoint> {
        let point = self.queue.pop_front();
        self.current = point;
        point
    }

    pub fn record_progress(&mut self, progress: f64) {
        self.progress = progress;
        self.progress_history.push(progress);
    }

    pub fn requeue<I: IntoIterator<Item = CalibrationPoint>>(&mut self, points: I) -> usize {
        let before = self.queue.len();
        self.queue.extend(points);
        let added = self.queue.len() - before;
        self.resamples += added;
        added
    }

    pub fn succeed(&mut self, now: DateTime<Utc>) {
        self.status = CalibrationStatus::Succeeded;
        self.success = true;
        self.finish(now);
    }

    pub fn abort(&mut self, now: DateTime<Utc>) {
        self.status = CalibrationStatus::Aborted;
        self.success = false;
        self.queue.clear();
        self.finish(now);
    }

    pub fn reset(&mut self) {
        *self = Self {
            round: self.round + 1,
            ..Self::default()
        };
    }

    pub fn snapshot(&self) -> CalibrationSnapshot {
        CalibrationSnapshot {
            status: self.status,
            session_id: self.session_id.clone(),
            attempts: self.attempts,
            resamples: self.resamples,
            remaining_points: self.queue.len(),
            success: self.success,
            busy: self.busy,
            progress: self.progress,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.current = None;
        self.busy = false;
        self.finished_at = Some(now);
        self.round += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSnapshot {
    pub status: CalibrationStatus,
    pub session_id: Option<String>,
    pub attempts: u32,
    pub resamples: usize,
    pub remaining_points: usize,
    pub success: bool,
    pub busy: bool,
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CalibrationSnapshot {
    /// Label for the calibration trigger.
    pub fn prompt(&self) -> &'static str {
        if self.success {
            "Calibration successful: Continue"
        } else if self.attempts > 0 {
            "Calibration failed: Recalibrate"
        } else {
            "Click to calibrate"
        }
    }
}
