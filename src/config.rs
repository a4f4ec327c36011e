//! Configuration for the DrishtiIO application
//!
//! Loads configuration from a TOML file. The file is also the persistence
//! target for host-written settings that must survive a reboot (exposure
//! time), so the whole structure serializes back out unchanged.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub logging: LoggingConfig,
}

/// TCP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for inbound commands
    ///
    /// Examples:
    /// - `0.0.0.0:49001` - Bind to all interfaces
    /// - `127.0.0.1:49001` - Localhost only
    pub cmd_address: String,

    /// TCP bind address for the outbound frame feed
    pub feed_address: String,
}

/// Camera configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    /// Camera driver to instantiate ("mock")
    pub device_type: String,
    /// Sensor width in pixels
    pub width: u32,
    /// Sensor height in pixels
    pub height: u32,
    /// Shutter exposure time applied at startup [us]
    pub exposure_us: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration with the mock camera.
    ///
    /// Suitable for testing and development. Production deployments should
    /// use a proper TOML configuration file.
    pub fn mock_defaults() -> Self {
        Self {
            network: NetworkConfig {
                cmd_address: "0.0.0.0:49001".to_string(),
                feed_address: "0.0.0.0:49000".to_string(),
            },
            camera: CameraConfig {
                device_type: "mock".to_string(),
                width: 752,
                height: 480,
                exposure_us: 15_000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::mock_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::mock_defaults();
        assert_eq!(config.network.cmd_address, "0.0.0.0:49001");
        assert_eq!(config.network.feed_address, "0.0.0.0:49000");
        assert_eq!(config.camera.device_type, "mock");
        assert_eq!(config.camera.width, 752);
        assert_eq!(config.camera.exposure_us, 15_000);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::mock_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[camera]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("device_type = \"mock\""));
        assert!(toml_string.contains("exposure_us = 15000"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[network]
cmd_address = "127.0.0.1:49001"
feed_address = "127.0.0.1:49000"

[camera]
device_type = "mock"
width = 640
height = 480
exposure_us = 441

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.network.cmd_address, "127.0.0.1:49001");
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.exposure_us, 441);
        assert_eq!(config.logging.level, "debug");
    }
}
