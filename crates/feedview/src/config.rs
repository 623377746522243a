use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub viewer: ViewerConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(config_str)?;
        config.viewer.validate()?;
        Ok(config)
    }
}

/// How the controller learns that a bound stream is actually showing frames.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Readiness {
    /// The surface reports `loaded` itself.
    Event,
    /// Degraded mode for surfaces without a load event: after `after_ms` the
    /// rendered dimensions are inspected, and anything non-zero counts as loaded.
    Poll { after_ms: u64 },
}

impl Default for Readiness {
    fn default() -> Self {
        Self::Event
    }
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_stream_path() -> String {
    "/stream".to_string()
}

fn default_control_path() -> String {
    "/control/click".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_reference_width() -> u32 {
    1280
}

fn default_reference_height() -> u32 {
    720
}

fn default_max_frame_len() -> usize {
    feedview_mjpeg::DEFAULT_MAX_FRAME_LEN
}

#[derive(Clone, Debug, Deserialize)]
pub struct ViewerConfig {
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_control_path")]
    pub control_path: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Automatic reconnects allowed after consecutive stream failures before the
    /// session gives up and waits for a manual start.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_reference_width")]
    pub reference_width: u32,
    #[serde(default = "default_reference_height")]
    pub reference_height: u32,
    #[serde(default)]
    pub readiness: Readiness,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl ViewerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            health_path: default_health_path(),
            stream_path: default_stream_path(),
            control_path: default_control_path(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            reference_width: default_reference_width(),
            reference_height: default_reference_height(),
            readiness: Readiness::default(),
            max_frame_len: default_max_frame_len(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)?;

        if self.health_check_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "health_check_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.reference_width == 0 || self.reference_height == 0 {
            return Err(Error::InvalidConfig(
                "reference resolution must not be empty".to_string(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(Error::InvalidConfig(
                "max_frame_len must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
