// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::device::CaptureFormat;
use crate::constants::{session, synthetic};
use crate::errors::StartupError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Synthetic test-pattern device settings
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    /// Frames per second for both streams
    pub fps: u32,
    /// Report end-of-stream after this many frames per stream (None = endless)
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            fps: synthetic::DEFAULT_FPS,
            frame_limit: None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video format the device starts in
    pub initial_format: CaptureFormat,
    /// Record one telemetry sample every N successful polls
    pub telemetry_every_polls: u32,
    /// Render to the terminal (false = headless, Ctrl+C to stop)
    pub terminal_display: bool,
    /// Synthetic device settings
    pub synthetic: SyntheticSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_format: CaptureFormat::default(),
            telemetry_every_polls: 1,
            terminal_display: true,
            synthetic: SyntheticSettings::default(),
        }
    }
}

impl Config {
    /// Load the config named by `KINECT_RECORD_CONFIG`, or the defaults
    pub fn load() -> Result<Self, StartupError> {
        match std::env::var_os(session::CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Parse a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, StartupError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StartupError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| StartupError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), StartupError> {
        if self.telemetry_every_polls == 0 {
            return Err(StartupError::Config(
                "telemetry_every_polls must be at least 1".to_string(),
            ));
        }
        if self.synthetic.fps == 0 {
            return Err(StartupError::Config(
                "synthetic.fps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
