//! Configuration management
//!
//! Runtime configuration loaded from JSON: selector defaults for the audio
//! session, the latency sampling period, the permissions checked before call
//! requests and telemetry buffer sizes. Missing or malformed files fall back
//! to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::audio::StreamConfig;
use crate::latency::DEFAULT_INTERVAL;
use crate::telephony::{Permission, PERMISSION_REQUEST_CODE, REQUIRED_PERMISSIONS};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioDefaults,
    pub latency: LatencyConfig,
    pub telephony: TelephonyConfig,
    pub telemetry: TelemetryConfig,
}

/// Selector defaults applied at startup and on every foreground
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDefaults {
    pub stream: StreamConfig,
    /// Reset selectors to `stream` each time the app comes to the foreground
    pub reset_selectors_on_foreground: bool,
}

impl Default for AudioDefaults {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            reset_selectors_on_foreground: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Sampling period in milliseconds
    pub interval_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl LatencyConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub required_permissions: Vec<Permission>,
    pub permission_request_code: i32,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            required_permissions: REQUIRED_PERMISSIONS.to_vec(),
            permission_request_code: PERMISSION_REQUEST_CODE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub channel_capacity: usize,
    pub history_capacity: usize,
    pub latency_window: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            history_capacity: 64,
            latency_window: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// If the file doesn't exist or the JSON is invalid, logs a warning and
    /// returns the default config.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration for the current platform
    ///
    /// Android has no filesystem path to the bundled assets here, so it runs
    /// on defaults.
    pub fn load() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "android")] {
                log::info!("[Config] Using default configuration on Android");
                Self::default()
            } else {
                Self::load_from_file("assets/hello_oboe.json")
            }
        }
    }
}
