//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides
//! earlier):
//! 1. Default values
//! 2. YAML config file (if specified via ELNODE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport selection, applied at the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// UDP port for ECHONET Lite traffic.
    pub udp_port: u16,
    /// Per-object timeout for property-map acquisition in milliseconds.
    pub property_map_acquire_timeout_ms: u64,
    /// Transport protocol selection.
    pub transport_protocol: TransportProtocol,
    /// Instance code of the local node-profile object.
    pub self_node_instance_code: u8,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            udp_port: elnode_protocol::DEFAULT_UDP_PORT,
            property_map_acquire_timeout_ms: 20_000,
            transport_protocol: TransportProtocol::Udp,
            self_node_instance_code: 0x01,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("ELNODE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("ELNODE_UDP_PORT") {
            if let Ok(n) = port.parse() {
                self.udp_port = n;
            }
        }

        if let Ok(timeout) = std::env::var("ELNODE_PROPERTY_MAP_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.property_map_acquire_timeout_ms = ms;
            }
        }

        if let Ok(proto) = std::env::var("ELNODE_TRANSPORT") {
            self.transport_protocol = match proto.to_lowercase().as_str() {
                "tcp" => TransportProtocol::Tcp,
                _ => TransportProtocol::Udp,
            };
        }

        if let Ok(code) = std::env::var("ELNODE_INSTANCE_CODE") {
            if let Ok(n) = code.parse() {
                self.self_node_instance_code = n;
            }
        }
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_node_instance_code == 0x00 {
            return Err(ConfigError::ValidationError(
                "self_node_instance_code 0x00 is reserved".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    pub fn with_property_map_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.property_map_acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_transport_protocol(mut self, protocol: TransportProtocol) -> Self {
        self.transport_protocol = protocol;
        self
    }

    pub fn with_self_node_instance_code(mut self, code: u8) -> Self {
        self.self_node_instance_code = code;
        self
    }

    /// Returns the property-map acquisition timeout as a Duration.
    pub fn property_map_acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.property_map_acquire_timeout_ms)
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(e) => write!(f, "invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.udp_port, 3610);
        assert_eq!(config.property_map_acquire_timeout_ms, 20_000);
        assert_eq!(config.transport_protocol, TransportProtocol::Udp);
        assert_eq!(config.self_node_instance_code, 0x01);
        assert_eq!(
            config.property_map_acquire_timeout(),
            Duration::from_secs(20)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::default()
            .with_udp_port(13610)
            .with_property_map_acquire_timeout(Duration::from_secs(5))
            .with_transport_protocol(TransportProtocol::Tcp)
            .with_self_node_instance_code(0x02);

        assert_eq!(config.udp_port, 13610);
        assert_eq!(config.property_map_acquire_timeout_ms, 5_000);
        assert_eq!(config.transport_protocol, TransportProtocol::Tcp);
        assert_eq!(config.self_node_instance_code, 0x02);
    }

    #[test]
    fn test_reserved_instance_code_rejected() {
        let config = ClientConfig::default().with_self_node_instance_code(0x00);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_yaml_parsing() {
        let config: ClientConfig =
            serde_yaml::from_str("udp_port: 13610\ntransport_protocol: tcp\n").unwrap();
        assert_eq!(config.udp_port, 13610);
        assert_eq!(config.transport_protocol, TransportProtocol::Tcp);
        // Unspecified fields keep their defaults.
        assert_eq!(config.self_node_instance_code, 0x01);
    }
}
