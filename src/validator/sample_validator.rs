use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::{
    models::{Point2D, RawFrame},
    settings::ValidatorConfig,
    tracker::GazeListener,
};

use super::{
    history::FrameHistory,
    state::{DistanceRange, ValidatedState},
};

// Called once per tracker sample; keep quiet unless debugging ingestion.
const ENABLE_LOGS: bool = false;

use crate::log_debug;

struct ValidatorInner {
    history: FrameHistory,
    distance: DistanceRange,
    frames_seen: u64,
}

/// Turns an unreliable frame stream into a continuously available best estimate.
///
/// Writers serialize on the history lock; readers only ever see whole
/// [`ValidatedState`] snapshots, swapped in after each ingest.
pub struct SampleValidator {
    inner: Mutex<ValidatorInner>,
    current: RwLock<Arc<ValidatedState>>,
}

#[derive(Debug, Default)]
struct Scan {
    left: Option<Point2D>,
    right: Option<Point2D>,
    coordinates: Option<(Point2D, Point2D)>,
}

impl Scan {
    fn complete(&self) -> bool {
        self.left.is_some() && self.right.is_some() && self.coordinates.is_some()
    }
}

impl SampleValidator {
    pub fn new(config: &ValidatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Mutex::new(ValidatorInner {
                history: FrameHistory::new(config.history_len)?,
                distance: DistanceRange::new(
                    config.initial_min_eye_distance,
                    config.initial_max_eye_distance,
                )?,
                frames_seen: 0,
            }),
            current: RwLock::new(Arc::new(ValidatedState::default())),
        })
    }

    pub fn ingest(&self, frame: RawFrame) {
        let mut inner = self.lock_inner();
        inner.history.push(frame);
        inner.frames_seen += 1;

        let scan = scan_history(&inner.history);
        let previous = self.snapshot();
        let next = derive_state(&previous, &scan, &mut inner.distance);

        log_debug!(
            "frame #{} ts={} resolved left={} right={} coords={}",
            inner.frames_seen,
            frame.timestamp_ms,
            scan.left.is_some(),
            scan.right.is_some(),
            scan.coordinates.is_some()
        );

        // Swapped while still holding the history lock so snapshots are
        // published in ingest order.
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<ValidatedState> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn left_eye(&self) -> Option<Point2D> {
        self.snapshot().left_eye
    }

    pub fn right_eye(&self) -> Option<Point2D> {
        self.snapshot().right_eye
    }

    pub fn user_midpoint(&self) -> Option<Point2D> {
        self.snapshot().user_midpoint
    }

    pub fn raw_gaze(&self) -> Option<Point2D> {
        self.snapshot().raw_gaze
    }

    pub fn smoothed_gaze(&self) -> Option<Point2D> {
        self.snapshot().smoothed_gaze
    }

    pub fn eye_distance_scale(&self) -> Option<f64> {
        self.snapshot().eye_distance_scale
    }

    pub fn eye_tilt_degrees(&self) -> Option<f64> {
        self.snapshot().eye_tilt_degrees
    }

    pub fn history_len(&self) -> usize {
        self.lock_inner().history.len()
    }

    pub fn frames_seen(&self) -> u64 {
        self.lock_inner().frames_seen
    }

    /// Current `(min, max)` of observed inter-eye distances.
    pub fn distance_range(&self) -> (f64, f64) {
        let inner = self.lock_inner();
        (inner.distance.min(), inner.distance.max())
    }

    fn lock_inner(&self) -> MutexGuard<'_, ValidatorInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GazeListener for SampleValidator {
    fn on_gaze_update(&self, frame: &RawFrame) {
        self.ingest(*frame);
    }
}

/// Newest to oldest, stopping once every fact has a value.
fn scan_history(history: &FrameHistory) -> Scan {
    let mut scan = Scan::default();
    for frame in history.newest_first() {
        if scan.left.is_none() {
            scan.left = frame.valid_left_eye();
        }
        if scan.right.is_none() {
            scan.right = frame.valid_right_eye();
        }
        if scan.coordinates.is_none() {
            scan.coordinates = frame.valid_coordinates();
        }
        if scan.complete() {
            break;
        }
    }
    scan
}

fn derive_state(
    previous: &ValidatedState,
    scan: &Scan,
    distance: &mut DistanceRange,
) -> ValidatedState {
    let mut next = previous.clone();

    if let Some(left) = scan.left {
        next.left_eye = Some(left);
    }
    if let Some(right) = scan.right {
        next.right_eye = Some(right);
    }
    if let Some((raw, smoothed)) = scan.coordinates {
        next.raw_gaze = Some(raw);
        next.smoothed_gaze = Some(smoothed);
    }

    if let (Some(left), Some(right)) = (next.left_eye, next.right_eye) {
        next.user_midpoint = Some(left.midpoint(&right));

        let eye_distance = left.distance_to(&right);
        distance.observe(eye_distance);
        next.eye_distance_scale = Some(distance.normalize(eye_distance));

        next.eye_tilt_degrees = Some((right.y - left.y).atan2(right.x - left.x).to_degrees());
    }

    next
}
