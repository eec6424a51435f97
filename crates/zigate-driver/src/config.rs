//! Driver configuration.
//!
//! ```yaml
//! address: /dev/ttyUSB0        # or 192.168.1.20:9999
//! baud_rate: 115200            # serial ports only
//! command_timeout_ms: 10000
//! reset_timeout_ms: 30000
//! event_capacity: 256
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_baud_rate() -> u32 {
    115_200
}

fn default_command_timeout_ms() -> u64 {
    10_000
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    256
}

/// Settings for a [`Driver`](crate::Driver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Serial device path or `host:port` of a network-attached coordinator.
    #[serde(default)]
    pub address: String,

    /// Line speed when the address names a serial port.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Default deadline for each expectation of a command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Deadline used by reset-class commands.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Events buffered per subscriber before the slowest one starts lagging.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            address: String::new(),
            baud_rate: default_baud_rate(),
            command_timeout_ms: default_command_timeout_ms(),
            reset_timeout_ms: default_reset_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl DriverConfig {
    /// Defaults with the given address.
    pub fn new(address: impl Into<String>) -> Self {
        DriverConfig {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Default command deadline.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Reset deadline.
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Parse a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Check that the configuration can be used to open a driver.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress);
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate(self.baud_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::new("/dev/ttyUSB0");
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.reset_timeout(), Duration::from_secs(30));
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.baud_rate, 115_200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = DriverConfig::from_yaml_str("address: 10.0.0.5:9999\ncommand_timeout_ms: 2500\n").unwrap();
        assert_eq!(config.address, "10.0.0.5:9999");
        assert_eq!(config.command_timeout(), Duration::from_millis(2500));
        assert_eq!(config.reset_timeout_ms, 30_000);
    }

    #[test]
    fn test_baud_rate_from_yaml() {
        let config = DriverConfig::from_yaml_str("address: /dev/ttyUSB0\nbaud_rate: 38400\n").unwrap();
        assert_eq!(config.baud_rate, 38_400);
        assert!(config.validate().is_ok());

        let config = DriverConfig::from_yaml_str("address: /dev/ttyUSB0\nbaud_rate: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaudRate(0))));
    }

    #[test]
    fn test_missing_address_fails_validation() {
        let config = DriverConfig::from_yaml_str("event_capacity: 8\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingAddress)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = DriverConfig::from_yaml_str("command_timeout_ms: [not, a, number]").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address: /dev/ttyACM0").unwrap();
        writeln!(file, "reset_timeout_ms: 45000").unwrap();

        let config = DriverConfig::from_file(file.path()).unwrap();
        assert_eq!(config.address, "/dev/ttyACM0");
        assert_eq!(config.reset_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DriverConfig::from_file(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
