//! Probe configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use temper::{DEFAULT_INTERFACE, DEFAULT_TIMEOUT, DeviceIdentity, SessionConfig, TEMPER};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub device: DeviceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "ProbeSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl ProbeSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

/// Which device to open and how to talk to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// VID:PID of the device model (e.g. "0c45:7401")
    #[serde(default)]
    pub identity: DeviceIdentity,
    /// Interface to claim
    #[serde(default = "DeviceSettings::default_interface")]
    pub interface: u8,
    /// Timeout for every transfer, in milliseconds
    #[serde(default = "DeviceSettings::default_timeout_ms")]
    pub timeout_ms: u64,
    /// Serial number to open; the first matching device when unset
    #[serde(default)]
    pub serial: Option<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            identity: TEMPER,
            interface: Self::default_interface(),
            timeout_ms: Self::default_timeout_ms(),
            serial: None,
        }
    }
}

impl DeviceSettings {
    fn default_interface() -> u8 {
        DEFAULT_INTERFACE
    }

    fn default_timeout_ms() -> u64 {
        DEFAULT_TIMEOUT.as_millis() as u64
    }

    /// Session parameters described by these settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            identity: self.identity,
            interface: self.interface,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => Self::search_paths()
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?,
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ProbeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load the first standard config file, or defaults if none exists.
    ///
    /// A config file that exists but cannot be read, parsed or validated is
    /// an error.
    pub fn load_or_default() -> Result<Self> {
        Self::load_first_or_default(&Self::search_paths())
    }

    fn load_first_or_default(candidates: &[PathBuf]) -> Result<Self> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load(Some(path.clone())),
            None => Ok(Self::default()),
        }
    }

    /// Standard config locations, in search order
    fn search_paths() -> Vec<PathBuf> {
        vec![Self::default_path(), PathBuf::from("/etc/temper/probe.toml")]
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("temper").join("probe.toml")
        } else {
            PathBuf::from(".config/temper/probe.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        common::validate_log_level(&self.probe.log_level)?;

        if self.device.timeout_ms == 0 {
            return Err(anyhow!("Invalid timeout_ms 0, must be greater than 0"));
        }

        if let Some(serial) = &self.device.serial {
            if serial.is_empty() {
                return Err(anyhow!("Empty serial number in [device] section"));
            }
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied config path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}
