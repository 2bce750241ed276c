/*!
Configuration management for the transceiver monitor.
*/

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sff::ModuleOptions;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Driver behavior applied to every port
    #[serde(default)]
    pub module: ModuleOptions,

    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            module: ModuleOptions::default(),
            ports: vec![PortConfig {
                name: "eth1/1/1".to_string(),
                image: PathBuf::from("./eeprom/eth1-1-1.bin"),
            }],
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.monitor.refresh_interval_ms == 0 {
            bail!("refresh_interval_ms must be greater than zero");
        }
        if self.monitor.channel_capacity == 0 {
            bail!("channel_capacity must be greater than zero");
        }
        let mut names: Vec<&str> = self.ports.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            bail!("port {} is configured more than once", pair[0]);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Refresh service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between two refresh cycles
    pub refresh_interval_ms: u64,

    /// Snapshots buffered before the refresher drops new ones
    pub channel_capacity: usize,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            channel_capacity: 64,
            pretty: false,
        }
    }
}

/// One monitored port backed by an EEPROM image file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfig {
    pub name: String,
    pub image: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = AppConfig::new();
        original_config.module.read_thresholds = false;
        original_config.ports.push(PortConfig {
            name: "eth1/2/1".to_string(),
            image: PathBuf::from("/tmp/eth1-2-1.bin"),
        });

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = AppConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::new();

        assert_eq!(config.monitor.refresh_interval_ms, 1000);
        assert_eq!(config.monitor.channel_capacity, 64);
        assert!(!config.monitor.pretty);
        assert!(config.module.read_thresholds);
        assert!(config.module.power_override);
        assert_eq!(config.ports.len(), 1);
        assert_eq!(config.ports[0].name, "eth1/1/1");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [monitor]
            refresh_interval_ms = 250

            [module]
            power_override = false

            [[ports]]
            name = "eth1/3/1"
            image = "a.bin"
            "#,
        )
        .unwrap();

        assert_eq!(config.monitor.refresh_interval_ms, 250);
        assert_eq!(config.monitor.channel_capacity, 64);
        assert!(config.module.read_thresholds);
        assert!(!config.module.power_override);
        assert_eq!(config.ports[0].image, PathBuf::from("a.bin"));
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::new();
        assert!(config.validate().is_ok());

        config.ports.push(config.ports[0].clone());
        assert!(config.validate().is_err());

        let mut config = AppConfig::new();
        config.monitor.refresh_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
