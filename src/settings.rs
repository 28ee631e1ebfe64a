use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::positioning::ScreenGeometry;

pub const SETTINGS_PATH_ENV: &str = "EYEGAZE_SETTINGS";
pub const DEBUG_ENV: &str = "EYEGAZE_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorConfig {
    /// Number of recent frames scanned for valid data.
    pub history_len: usize,
    pub initial_min_eye_distance: f64,
    pub initial_max_eye_distance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            history_len: 30,
            initial_min_eye_distance: 0.1,
            initial_max_eye_distance: 0.3,
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_len == 0 {
            bail!("validator historyLen must be at least 1");
        }
        let (min, max) = (self.initial_min_eye_distance, self.initial_max_eye_distance);
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min >= max {
            bail!("eye distance range must satisfy 0 <= min < max (got {min}..{max})");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalibrationConfig {
    pub screen: ScreenGeometry,
    /// Inset of the outer grid rows/columns, as a fraction of screen height.
    pub buffer_pct: f64,
    pub switch_delay_ms: u64,
    pub start_delay_ms: u64,
    pub end_delay_ms: u64,
    pub max_attempts: u32,
    pub max_resample: usize,
    pub tick_interval_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            screen: ScreenGeometry::default(),
            buffer_pct: 0.15,
            switch_delay_ms: 250,
            start_delay_ms: 250,
            end_delay_ms: 1500,
            max_attempts: 3,
            max_resample: 4,
            tick_interval_ms: 16,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        self.screen.validate()?;
        if !(0.0..0.5).contains(&self.buffer_pct) {
            bail!("calibration bufferPct must be in [0, 0.5) (got {})", self.buffer_pct);
        }
        if self.end_delay_ms <= self.start_delay_ms {
            bail!(
                "calibration endDelayMs ({}) must exceed startDelayMs ({})",
                self.end_delay_ms,
                self.start_delay_ms
            );
        }
        if self.max_attempts == 0 || self.max_resample == 0 {
            bail!("calibration maxAttempts and maxResample must be at least 1");
        }
        if self.tick_interval_ms == 0 {
            bail!("calibration tickIntervalMs must be at least 1");
        }
        Ok(())
    }

    pub fn switch_delay(&self) -> Duration {
        Duration::from_millis(self.switch_delay_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn end_delay(&self) -> Duration {
        Duration::from_millis(self.end_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayConfig {
    pub eye_distance_modifier: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            eye_distance_modifier: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GazeSettings {
    pub validator: ValidatorConfig,
    pub calibration: CalibrationConfig,
    pub overlay: OverlayConfig,
}

impl GazeSettings {
    pub fn validate(&self) -> Result<()> {
        self.validator.validate()?;
        self.calibration.validate()?;
        if !self.overlay.eye_distance_modifier.is_finite() {
            bail!("overlay eyeDistanceModifier must be finite");
        }
        Ok(())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<GazeSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unparsable settings at {}: {err}", path.display());
                GazeSettings::default()
            })
        } else {
            GazeSettings::default()
        };

        data.validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Settings path from `EYEGAZE_SETTINGS`, or `eyegaze.json` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("eyegaze.json"))
    }

    pub fn settings(&self) -> GazeSettings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update(&self, settings: GazeSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: GazeSettings = serde_json::from_str(&contents)?;
        data.validate()?;
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &GazeSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

pub fn debug_mode() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
