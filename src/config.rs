//! Configuration for punchsync.

use crate::core::AdmissionPolicy;
use crate::device::{DeviceTarget, DEFAULT_DEVICE_PORT};
use crate::gateway::GatewayConfig;
use crate::sync::{FailurePolicy, FileWatermarkStore, SchedulerConfig};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal connection settings
    pub device: DeviceSettings,

    /// Remote collector settings
    pub collector: CollectorSettings,

    /// Background sync settings
    pub sync: SyncSettings,

    /// Path for exported session files
    pub export_path: PathBuf,

    /// Path for state such as the sync watermark
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("punchsync");

        Self {
            device: DeviceSettings::default(),
            collector: CollectorSettings::default(),
            sync: SyncSettings::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("punchsync")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Where the sync watermark is persisted.
    pub fn watermark_path(&self) -> PathBuf {
        self.sync
            .watermark_path
            .clone()
            .unwrap_or_else(|| self.data_path.join("last_sync.txt"))
    }

    /// Watermark store at [`Config::watermark_path`], reading offset-less
    /// timestamps in the device timezone.
    pub fn watermark_store(&self) -> Result<FileWatermarkStore, ConfigError> {
        let timezone = self.device.timezone()?;
        Ok(FileWatermarkStore::new(self.watermark_path()).with_timezone(timezone))
    }

    pub fn device_target(&self) -> DeviceTarget {
        DeviceTarget {
            address: self.device.address.clone(),
            port: self.device.port,
            timeout: self.device.timeout,
            password: self.device.password,
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.collector.url.clone(),
            api_key: self.collector.api_key.clone(),
            timeout: self.collector.timeout,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: self.sync.poll_interval,
            policy: self.sync.allowed_days,
            failure_policy: self.sync.failure_policy,
        }
    }
}

/// Terminal connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub address: String,
    pub port: u16,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
    pub password: u32,
    /// IANA timezone of the terminal clock
    pub timezone: String,
    /// Attendance dump read instead of a live terminal
    pub dump_path: Option<PathBuf>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            address: "192.168.1.201".to_string(),
            port: DEFAULT_DEVICE_PORT,
            timeout: Duration::from_secs(5),
            password: 0,
            timezone: "Africa/Lagos".to_string(),
            dump_path: None,
        }
    }
}

impl DeviceSettings {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::ParseError(format!("timezone '{}': {e}", self.timezone)))
    }
}

/// Remote collector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub url: String,
    pub api_key: String,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/api/attendance/device".to_string(),
            api_key: String::new(),
            timeout: crate::gateway::DEFAULT_TIMEOUT,
        }
    }
}

/// Background sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Weekdays on which punches are forwarded
    pub allowed_days: AdmissionPolicy,
    pub failure_policy: FailurePolicy,
    /// Overrides `<data_path>/last_sync.txt`
    pub watermark_path: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            allowed_days: AdmissionPolicy::default(),
            failure_policy: FailurePolicy::default(),
            watermark_path: None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
