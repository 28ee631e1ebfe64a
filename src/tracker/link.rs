use log::{info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex};

use super::{ClientMode, TrackerControl, TrackerState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub connected: bool,
    pub active: bool,
}

/// Brings the tracker from "connected" to "activated in push mode" and
/// remembers where it got to.
pub struct TrackerLink {
    tracker: Arc<dyn TrackerControl>,
    status: Mutex<LinkStatus>,
}

impl TrackerLink {
    pub fn new(tracker: Arc<dyn TrackerControl>) -> Self {
        Self {
            tracker,
            status: Mutex::new(LinkStatus::default()),
        }
    }

    /// Called once per tick until the link is active.
    pub fn poll(&self) -> LinkStatus {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if status.active {
            return *status;
        }

        let tracker_state = self.tracker.tracker_state();
        if tracker_state != TrackerState::Connected {
            return *status;
        }

        if !status.connected {
            info!("Tracker connected");
            status.connected = true;
        }

        match self.tracker.activate(ClientMode::Push) {
            Ok(()) => {
                info!("Tracker activated in push mode");
                status.active = true;
            }
            Err(err) => warn!("Tracker activation failed: {err:#}"),
        }

        *status
    }

    pub fn status(&self) -> LinkStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn can_calibrate(&self) -> bool {
        let status = self.status();
        status.connected && status.active
    }

    pub fn shutdown(&self) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if status.active {
            self.tracker.deactivate();
            info!("Tracker deactivated");
        }
        *status = LinkStatus::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{SimulatedTracker, TrackerCommand};

    #[test]
    fn activates_once_connected() {
        let tracker = Arc::new(SimulatedTracker::new());
        tracker.set_tracker_state(TrackerState::NotConnected);
        let link = TrackerLink::new(tracker.clone());

        assert_eq!(link.poll(), LinkStatus::default());
        assert!(!link.can_calibrate());

        tracker.set_tracker_state(TrackerState::Connected);
        let status = link.poll();
        assert!(status.connected && status.active);
        assert!(link.can_calibrate());

        // Further polls do not re-activate.
        link.poll();
        let activations = tracker
            .commands()
            .into_iter()
            .filter(|c| *c == TrackerCommand::Activate)
            .count();
        assert_eq!(activations, 1);

        link.shutdown();
        assert!(!tracker.is_activated());
        assert_eq!(link.status(), LinkStatus::default());
    }
}
