pub mod calibration;
pub mod models;
pub mod positioning;
pub mod settings;
pub mod tracker;
pub mod utils;
pub mod validator;

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use calibration::{CalibrationDriver, CalibrationSession, CalibrationStatus};
use positioning::{gaze_viewport_position, EyeOverlay, ViewportBounds};
use settings::SettingsStore;
use tracker::{
    FrameGenerator, GazeListener, RecordingTarget, ScriptedOutcome, SimulatedTracker,
    TrackerControl, TrackerLink,
};
use validator::SampleValidator;

const DEMO_TIMEOUT: Duration = Duration::from_secs(120);
const DEMO_DROPOUT: f64 = 0.2;

/// Services shared by the gaze pipeline: one tracker, the link that activates
/// it, the validator fed by its frames and the calibration driver.
pub(crate) struct AppState {
    pub(crate) settings: SettingsStore,
    pub(crate) tracker: Arc<dyn TrackerControl>,
    pub(crate) link: Arc<TrackerLink>,
    pub(crate) validator: Arc<SampleValidator>,
    pub(crate) calibration: CalibrationDriver,
}

impl AppState {
    fn new(settings: SettingsStore, tracker: Arc<dyn TrackerControl>) -> Result<Self> {
        let config = settings.settings();

        let validator = Arc::new(SampleValidator::new(&config.validator)?);
        tracker.add_gaze_listener(validator.clone());

        let link = Arc::new(TrackerLink::new(Arc::clone(&tracker)));
        let session = CalibrationSession::new(config.calibration, Arc::clone(&tracker))?
            .with_target(Box::new(RecordingTarget::new()));

        Ok(Self {
            settings,
            tracker,
            link,
            validator,
            calibration: CalibrationDriver::new(session),
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.calibration.stop().await?;
        let listener: Arc<dyn GazeListener> = self.validator.clone();
        self.tracker.remove_gaze_listener(&listener);
        self.link.shutdown();
        Ok(())
    }
}

pub fn run() -> Result<()> {
    let debug = settings::debug_mode();

    // RUST_LOG still overrides per-module levels.
    env_logger::Builder::from_default_env()
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let store = SettingsStore::new(SettingsStore::default_path())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run_demo(store, debug))
}

async fn run_demo(store: SettingsStore, debug: bool) -> Result<()> {
    let tracker = Arc::new(SimulatedTracker::with_script(vec![
        ScriptedOutcome::Invalid { flagged: 2 },
        ScriptedOutcome::Valid,
    ]));
    let mut state = AppState::new(store, tracker.clone())?;
    let settings = state.settings.settings();

    let feeder_token = CancellationToken::new();
    let feeder = spawn_frame_feeder(
        tracker,
        FrameGenerator::new(settings.calibration.screen, DEMO_DROPOUT, None),
        feeder_token.clone(),
    );

    let tick = if debug {
        Duration::from_millis(1)
    } else {
        settings.calibration.tick_interval()
    };
    state.calibration.start(tick, Some(Arc::clone(&state.link)))?;

    let outcome = tokio::time::timeout(DEMO_TIMEOUT, calibrate(&state)).await;

    feeder_token.cancel();
    feeder.await.context("frame feeder task failed to join")?;

    match outcome {
        Ok(Ok(status)) => info!("Calibration finished: {}", status.as_str()),
        Ok(Err(err)) => warn!("Calibration did not run: {err:#}"),
        Err(_) => warn!("Calibration timed out after {}s", DEMO_TIMEOUT.as_secs()),
    }

    let snapshot = state.validator.snapshot();
    let screen = settings.calibration.screen;
    match EyeOverlay::compute(
        &snapshot,
        &screen,
        state.tracker.is_calibrating(),
        settings.overlay.eye_distance_modifier,
    ) {
        Some(overlay) => info!("Eye overlay: {}", serde_json::to_string(&overlay)?),
        None => info!("Eye overlay hidden: no eyes seen yet"),
    }
    if let Some(cursor) = gaze_viewport_position(&snapshot, &screen, &ViewportBounds::default()) {
        info!("Gaze cursor at ({:.3}, {:.3})", cursor.x, cursor.y);
    }
    info!(
        "Validator ingested {} frames, eye distance range {:?}",
        state.validator.frames_seen(),
        state.validator.distance_range()
    );

    state.shutdown().await
}

async fn calibrate(state: &AppState) -> Result<CalibrationStatus> {
    let mut snapshots = state.calibration.subscribe();

    while !state.link.can_calibrate() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    state.calibration.calibrate(Some(state.link.as_ref())).await?;

    loop {
        let status = snapshots.borrow_and_update().status;
        if status.is_terminal() {
            info!("{}", snapshots.borrow().prompt());
            return Ok(status);
        }
        snapshots
            .changed()
            .await
            .context("calibration driver stopped publishing")?;
    }
}

fn spawn_frame_feeder(
    tracker: Arc<SimulatedTracker>,
    mut generator: FrameGenerator,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(FrameGenerator::FRAME_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => tracker.push_frame(generator.next_frame()),
                _ = cancel_token.cancelled() => break,
            }
        }
    })
}
