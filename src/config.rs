//! Application configuration
//!
//! Loaded from TOML. Every section and field has a default, so a config
//! file only needs the values that differ.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub playback: PlaybackConfig,
    pub ui: UiConfig,
}

/// How the device identifies itself to leaders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub hostname: String,
    pub description: String,
    /// `"major.minor[...]"`
    pub firmware_version: String,
    pub build_date: String,
    pub hardware_type: u8,
    pub variant: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hostname: "pixelsync".to_string(),
            description: String::new(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            build_date: String::new(),
            hardware_type: DEFAULT_HARDWARE_TYPE,
            variant: DEFAULT_VARIANT_NAME.to_string(),
        }
    }
}

impl DeviceConfig {
    /// Leading numbers of the firmware version, e.g. `"4.1-rc2"` -> `(4, 1)`
    pub fn version_numbers(&self) -> (u16, u16) {
        let mut parts = self.firmware_version.split('.');
        let mut number = || {
            parts
                .next()
                .map(|p| {
                    let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
                    digits.parse().unwrap_or(0)
                })
                .unwrap_or(0)
        };
        let major = number();
        let minor = number();
        (major, minor)
    }

    /// Version text as reported to leaders, with the build date appended
    pub fn full_version(&self) -> String {
        if self.build_date.is_empty() {
            self.firmware_version.clone()
        } else {
            format!("{}:{}", self.firmware_version, self.build_date)
        }
    }
}

/// Sync listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub discovery_port: u16,
    pub multicast_group: Ipv4Addr,
    pub sync_enabled: bool,
    /// Device address; when unset the first non-loopback interface route is used
    pub local_address: Option<Ipv4Addr>,
    pub recv_buffer_size: usize,
    /// Pending commands the engine inbox holds before senders back off
    pub inbox_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: DISCOVERY_PORT,
            multicast_group: MULTICAST_GROUP,
            sync_enabled: true,
            local_address: None,
            recv_buffer_size: 64 * 1024,
            inbox_capacity: 256,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub sequence_dir: PathBuf,
    /// Sequence looped locally; `"..."` defers to a remote leader
    pub autoplay: String,
    /// Size of the shared output buffer in channels
    pub output_channels: usize,
    pub poll_interval_ms: u64,
    /// Blank the output after this long without new frames; 0 disables
    pub blank_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sequence_dir: PathBuf::from("sequences"),
            autoplay: REMOTE_PLAY_SENTINEL.to_string(),
            output_channels: DEFAULT_OUTPUT_CHANNELS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            blank_timeout_secs: 5,
        }
    }
}

/// HTTP query surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Platform config location, e.g. `~/.config/pixelsync/pixelsync.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pixelsync")
            .map(|dirs| dirs.config_dir().join("pixelsync.toml"))
    }

    /// Load from `path`, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.playback.output_channels == 0 {
            return Err(Error::Config("playback.output_channels must be > 0".into()));
        }
        if self.playback.poll_interval_ms == 0 {
            return Err(Error::Config("playback.poll_interval_ms must be > 0".into()));
        }
        if self.network.inbox_capacity == 0 {
            return Err(Error::Config("network.inbox_capacity must be > 0".into()));
        }
        if !self.network.multicast_group.is_multicast() {
            return Err(Error::Config(format!(
                "network.multicast_group {} is not a multicast address",
                self.network.multicast_group
            )));
        }
        Ok(())
    }
}
