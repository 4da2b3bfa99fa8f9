//! Server configuration
//!
//! Loaded once at startup from a JSON file (camelCase keys, every field
//! optional), overridden by command-line flags, validated, then passed by value
//! to whatever needs it.
//!
//! ```json
//! {
//!   "source": "emulator",
//!   "server": { "ipAddress": "0.0.0.0", "port": 1234 },
//!   "rate": 16.7,
//!   "debug": false,
//!   "reconnectDelay": 2000,
//!   "sourceOptions": { "vehicles": ["Cessna Skyhawk", "Piper PA44"] }
//! }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServerError};

/// Config file used when none is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Top-level server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Registered name of the data source to use
    pub source: String,
    pub server: BindConfig,
    /// Poll rate of the data source in milliseconds, which is also the send
    /// rate (16.7 ms = 60 Hz)
    pub rate: f64,
    /// Verbose diagnostics
    pub debug: bool,
    /// Milliseconds between data-source connection attempts
    pub reconnect_delay: u64,
    /// Handed to the data source constructor untouched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_options: Option<Value>,
}

/// Where the broadcast server listens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindConfig {
    pub ip_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            source: "emulator".to_string(),
            server: BindConfig::default(),
            rate: 16.7,
            debug: false,
            reconnect_delay: 2000,
            source_options: None,
        }
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            ip_address: "0.0.0.0".to_string(),
            port: 1234,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path`, or from [`DEFAULT_CONFIG_PATH`]
    ///
    /// A missing default file yields the defaults. A missing explicit path is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.exists() {
            return if explicit {
                Err(ServerError::ConfigNotFound(path))
            } else {
                Ok(Self::default())
            };
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ServerError::ConfigRead {
            path: path.clone(),
            source,
        })?;

        Self::from_json(&text).map_err(|source| ServerError::ConfigParse { path, source })
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(ServerError::InvalidConfig(
                "source name must not be empty".to_string(),
            ));
        }

        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(ServerError::InvalidConfig(format!(
                "rate must be a positive number of milliseconds, got {}",
                self.rate
            )));
        }

        if self.server.port == 0 {
            return Err(ServerError::InvalidConfig(
                "server port must not be 0".to_string(),
            ));
        }

        self.bind_addr()?;
        Ok(())
    }

    /// Socket address the broadcast server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.server.ip_address.trim().parse().map_err(|_| {
            ServerError::InvalidConfig(format!(
                "'{}' is not a valid IP address",
                self.server.ip_address
            ))
        })?;

        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Data-source poll interval
    ///
    /// Only meaningful after `validate`; a non-positive rate maps to zero.
    pub fn poll_rate(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate / 1000.0).unwrap_or(Duration::ZERO)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.source, "emulator");
        assert_eq!(config.bind_addr().unwrap(), "0.0.0.0:1234".parse().unwrap());
        assert_eq!(config.reconnect_delay(), Duration::from_secs(2));
        assert!((config.poll_rate().as_secs_f64() * 1000.0 - 16.7).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ServerConfig::from_json(
            r#"{"source": "cpu", "server": {"port": 4000}, "sourceOptions": {"vehicles": ["A"]}}"#,
        )
        .unwrap();

        assert_eq!(config.source, "cpu");
        assert_eq!(config.server.ip_address, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.rate, 16.7);
        assert_eq!(
            config.source_options,
            Some(serde_json::json!({"vehicles": ["A"]}))
        );
    }

    #[rstest]
    #[case(r#"{"source": " "}"#)]
    #[case(r#"{"rate": 0}"#)]
    #[case(r#"{"rate": -5}"#)]
    #[case(r#"{"server": {"port": 0}}"#)]
    #[case(r#"{"server": {"ipAddress": "localhost"}}"#)]
    fn test_validate_rejects(#[case] json: &str) {
        let config = ServerConfig::from_json(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debug": true, "reconnectDelay": 50}}"#).unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert!(config.debug);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        assert!(matches!(
            ServerConfig::load(Some(file.path())),
            Err(ServerError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let path = Path::new("/definitely/not/here/config.json");
        assert!(matches!(
            ServerConfig::load(Some(path)),
            Err(ServerError::ConfigNotFound(_))
        ));
    }
}
