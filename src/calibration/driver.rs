use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::tracker::TrackerLink;

use super::session::CalibrationSession;
use super::state::CalibrationSnapshot;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Per-frame driver for a [`CalibrationSession`]: polls the tracker link,
/// runs the session's queued work and publishes a snapshot whenever it
/// changes.
pub struct CalibrationDriver {
    session: Arc<Mutex<CalibrationSession>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    snapshot_tx: watch::Sender<CalibrationSnapshot>,
}

impl CalibrationDriver {
    pub fn new(session: CalibrationSession) -> Self {
        let (snapshot_tx, _) = watch::channel(session.snapshot());
        Self {
            session: Arc::new(Mutex::new(session)),
            handle: None,
            cancel_token: None,
            snapshot_tx,
        }
    }

    pub fn session(&self) -> Arc<Mutex<CalibrationSession>> {
        Arc::clone(&self.session)
    }

    pub fn subscribe(&self) -> watch::Receiver<CalibrationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts a calibration run. Refused when the link reports no usable tracker.
    pub async fn calibrate(&self, link: Option<&TrackerLink>) -> Result<()> {
        if let Some(link) = link {
            if !link.poll().active {
                bail!("tracker is not connected and active");
            }
        }
        let mut session = self.session.lock().await;
        session.start()?;
        self.snapshot_tx.send_replace(session.snapshot());
        Ok(())
    }

    pub async fn reset(&self) {
        let mut session = self.session.lock().await;
        session.reset();
        self.snapshot_tx.send_replace(session.snapshot());
    }

    pub fn start(&mut self, tick_interval: Duration, link: Option<Arc<TrackerLink>>) -> Result<()> {
        if self.handle.is_some() {
            bail!("calibration driver already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(drive_loop(
            Arc::clone(&self.session),
            link,
            tick_interval,
            self.snapshot_tx.clone(),
            cancel_token.clone(),
        ));

        info!("Calibration driver started ({}ms tick)", tick_interval.as_millis());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("calibration driver task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

async fn drive_loop(
    session: Arc<Mutex<CalibrationSession>>,
    link: Option<Arc<TrackerLink>>,
    tick_interval: Duration,
    snapshot_tx: watch::Sender<CalibrationSnapshot>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(link) = &link {
                    link.poll();
                }

                let snapshot = {
                    let mut session = session.lock().await;
                    let ran = session.tick();
                    if ran > 0 {
                        log_debug!("Calibration tick ran {ran} task(s)");
                    }
                    session.snapshot()
                };

                snapshot_tx.send_if_modified(|current| {
                    if *current == snapshot {
                        false
                    } else {
                        *current = snapshot;
                        true
                    }
                });
            }
            _ = cancel_token.cancelled() => {
                log_info!("calibration driver shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationStatus;
    use crate::settings::CalibrationConfig;
    use crate::tracker::{ClientMode, RecordingTarget, SimulatedTracker, TrackerControl};

    #[tokio::test(start_paused = true)]
    async fn drives_session_to_success_and_publishes() -> Result<()> {
        let tracker = Arc::new(SimulatedTracker::new());
        tracker.activate(ClientMode::Push)?;
        let session = CalibrationSession::new(CalibrationConfig::default(), tracker.clone())?
            .with_target(Box::new(RecordingTarget::new()));

        let mut driver = CalibrationDriver::new(session);
        let mut snapshots = driver.subscribe();
        driver.start(Duration::from_millis(16), None)?;
        assert!(driver.start(Duration::from_millis(16), None).is_err());

        driver.calibrate(None).await?;
        assert!(snapshots.borrow_and_update().busy);

        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                if snapshots.borrow_and_update().status.is_terminal() {
                    break;
                }
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("calibration never finished")?;

        let last = snapshots.borrow().clone();
        assert_eq!(last.status, CalibrationStatus::Succeeded);
        assert!(!last.busy);
        assert_eq!(last.prompt(), "Calibration successful: Continue");

        driver.stop().await?;
        assert!(!driver.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn calibrate_requires_active_link() -> Result<()> {
        let tracker = Arc::new(SimulatedTracker::new());
        tracker.set_tracker_state(crate::tracker::TrackerState::NotConnected);
        let link = TrackerLink::new(tracker.clone());
        let session = CalibrationSession::new(CalibrationConfig::default(), tracker)?
            .with_target(Box::new(RecordingTarget::new()));
        let driver = CalibrationDriver::new(session);

        assert!(driver.calibrate(Some(&link)).await.is_err());
        assert_eq!(
            driver.session().lock().await.status(),
            CalibrationStatus::Idle
        );
        Ok(())
    }
}
