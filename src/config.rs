//! Application configuration
//!
//! Loaded from a TOML file. Every field has a default so a partial file (or
//! no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub control: ControlConfig,
    pub playback: PlaybackConfig,
    pub discovery: DiscoveryConfig,
}

/// Control server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Address the control server binds to
    pub bind_address: String,
    /// Control port (WebSocket and HTTP API)
    pub port: u16,
    /// Path of the duplex control endpoint
    pub path: String,
    /// Timeout for dialing a remote host
    pub connect_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_CONTROL_PORT,
            path: CONTROL_PATH.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ControlConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Playback engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Progress notifier period
    pub progress_interval_ms: u64,
    /// Volume level (0..100) applied before the first `volume` command
    pub initial_volume: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            initial_volume: 100.0,
        }
    }
}

impl PlaybackConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// LAN discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub service_type: String,
    /// Advertised instance name; `<hostname>-<ip>` when unset
    pub instance_name: Option<String>,
    pub browse_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_type: SERVICE_TYPE.to_string(),
            instance_name: None,
            browse_timeout_ms: DEFAULT_BROWSE_TIMEOUT_MS,
        }
    }
}

impl DiscoveryConfig {
    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `config.toml` from the platform config directory, falling back
    /// to defaults when it does not exist
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.control.port == 0 {
            return Err(Error::Config("control.port must be non-zero".into()));
        }
        if !self.control.path.starts_with('/') {
            return Err(Error::Config(format!(
                "control.path must start with '/': {}",
                self.control.path
            )));
        }
        if self.playback.progress_interval_ms == 0 {
            return Err(Error::Config(
                "playback.progress_interval_ms must be non-zero".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.playback.initial_volume) {
            return Err(Error::Config(format!(
                "playback.initial_volume out of range: {}",
                self.playback.initial_volume
            )));
        }
        if self.discovery.browse_timeout_ms == 0 {
            return Err(Error::Config(
                "discovery.browse_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/lan-audio-share/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("net", "lan-audio", "lan-audio-share")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
