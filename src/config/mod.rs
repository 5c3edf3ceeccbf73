//! Configuration management for the accessory station
//!
//! Handles loading, saving and validating the YAML configuration file. Every
//! section and field has a default, so a missing file or an empty section
//! yields a working configuration.

use crate::hal::default_restricted_pins;
use crate::sensors::MAX_REMOTE_SENSOR_ID;
use crate::storage::StorageBackend;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "station.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub remote_sensors: RemoteSensorsConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Where persisted documents live
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputsConfig {
    /// Pins a new output may not be created on
    #[serde(default = "default_restricted_pins")]
    pub restricted_pins: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteSensorsConfig {
    /// Offset added to raw remote sensor ids
    #[serde(default = "default_first_sensor_id")]
    pub first_sensor_id: u16,
    /// Silence after which an active remote sensor is turned off
    #[serde(default = "default_decay_ms")]
    pub decay_ms: u64,
    /// Decay sweep period, 0 selects half of `decay_ms`
    #[serde(default)]
    pub sweep_interval_ms: u64,
}

/// Text command protocol listener
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_protocol_port")]
    pub port: u16,
}

/// HTTP API listener
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            restricted_pins: default_restricted_pins(),
        }
    }
}

impl Default for RemoteSensorsConfig {
    fn default() -> Self {
        Self {
            first_sensor_id: default_first_sensor_id(),
            decay_ms: default_decay_ms(),
            sweep_interval_ms: 0,
        }
    }
}

impl RemoteSensorsConfig {
    pub fn decay_window(&self) -> Duration {
        Duration::from_millis(self.decay_ms)
    }

    /// Sweep period with the 0 = half-window rule applied
    pub fn sweep_interval(&self) -> Duration {
        if self.sweep_interval_ms == 0 {
            self.decay_window() / 2
        } else {
            Duration::from_millis(self.sweep_interval_ms)
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_protocol_port(),
        }
    }
}

impl ProtocolConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
            port: default_api_port(),
        }
    }
}

impl ApiConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file parses as a null document
        let config: AppConfig = if yaml.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(yaml).context("Failed to parse YAML config")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.as_os_str().is_empty() {
            anyhow::bail!("storage.path cannot be empty");
        }

        let sensors = &self.remote_sensors;
        if sensors.decay_ms == 0 {
            anyhow::bail!("remote_sensors.decay_ms must be greater than 0");
        }
        if sensors.sweep_interval_ms > sensors.decay_ms / 2 {
            anyhow::bail!(
                "remote_sensors.sweep_interval_ms ({}) must not exceed half of decay_ms ({})",
                sensors.sweep_interval_ms,
                sensors.decay_ms
            );
        }
        if sensors.first_sensor_id.checked_add(MAX_REMOTE_SENSOR_ID).is_none() {
            anyhow::bail!(
                "remote_sensors.first_sensor_id {} leaves no room for {} remote sensor ids",
                sensors.first_sensor_id,
                MAX_REMOTE_SENSOR_ID
            );
        }

        if self.api.enabled
            && self.api.port == self.protocol.port
            && self.api.bind == self.protocol.bind
        {
            anyhow::bail!(
                "protocol and api cannot both listen on {}",
                self.protocol.address()
            );
        }

        Ok(())
    }
}

fn default_storage_path() -> PathBuf { PathBuf::from("./data") }
fn default_first_sensor_id() -> u16 { 100 }
fn default_decay_ms() -> u64 { 60_000 }
fn default_bind() -> String { "0.0.0.0".to_string() }
fn default_protocol_port() -> u16 { 2560 }
fn default_api_port() -> u16 { 8080 }
fn default_true() -> bool { true }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, PathBuf::from("./data"));
        assert_eq!(config.outputs.restricted_pins, vec![0, 1, 3, 6, 7, 8, 9, 10, 11]);
        assert_eq!(config.remote_sensors.first_sensor_id, 100);
        assert_eq!(config.remote_sensors.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.protocol.port, 2560);
        assert!(config.api.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
storage:
  backend: sled
remote_sensors:
  decay_ms: 10000
  sweep_interval_ms: 1000
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.storage.path, PathBuf::from("./data"));
        assert_eq!(config.remote_sensors.decay_window(), Duration::from_secs(10));
        assert_eq!(config.remote_sensors.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_validation_failures() {
        let invalid = [
            "remote_sensors:\n  decay_ms: 0\n",
            "remote_sensors:\n  decay_ms: 1000\n  sweep_interval_ms: 501\n",
            "remote_sensors:\n  first_sensor_id: 40000\n",
            "api:\n  port: 2560\n",
            "storage:\n  path: \"\"\n",
            "storage:\n  backend: flash\n",
        ];
        for yaml in invalid {
            assert!(AppConfig::from_yaml(yaml).is_err(), "accepted: {}", yaml);
        }
    }

    #[test]
    fn test_same_port_on_other_bind_allowed() {
        let yaml = "api:\n  bind: 127.0.0.1\n  port: 2560\n";
        assert!(AppConfig::from_yaml(yaml).is_ok());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("station.yaml");

        let mut config = AppConfig::default();
        config.protocol.port = 3000;
        config.outputs.restricted_pins = vec![1, 2];
        config.save(&path).await.unwrap();

        assert_eq!(AppConfig::load(&path).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_or_default_missing_file() {
        let temp = tempdir().unwrap();
        let config = AppConfig::load_or_default(temp.path().join("absent.yaml"))
            .await
            .unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
