//! Command-line flags
//!
//! Each flag maps onto exactly one config field; flags that are not given
//! leave the loaded configuration alone.

use std::path::PathBuf;

use clap::Parser;

use crate::config::ServerConfig;

/// OpenGauge server
///
/// Bridges one live flight-data source to any number of gauge rendering
/// clients over newline-delimited JSON.
#[derive(Parser, Debug, Default)]
#[command(name = "opengauge-server")]
#[command(about = "Keeps gauge rendering clients in sync with a live flight-data source")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON config file (default: ./config.json if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data source to use (emulator, cpu)
    #[arg(short, long)]
    pub source: Option<String>,

    /// IP address to listen on
    #[arg(long)]
    pub ip_address: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Data-source poll rate in milliseconds
    #[arg(short, long)]
    pub rate: Option<f64>,

    /// Verbose diagnostics
    #[arg(short, long)]
    pub debug: bool,

    /// Milliseconds between data-source connection attempts
    #[arg(long)]
    pub reconnect_delay: Option<u64>,
}

impl Cli {
    /// Apply every flag that was given to `config`
    pub fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(source) = &self.source {
            config.source = source.clone();
        }
        if let Some(ip_address) = &self.ip_address {
            config.server.ip_address = ip_address.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(reconnect_delay) = self.reconnect_delay {
            config.reconnect_delay = reconnect_delay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "opengauge-server",
            "--source",
            "cpu",
            "--ip-address",
            "127.0.0.1",
            "--port",
            "4321",
            "--rate",
            "50",
            "--debug",
            "--reconnect-delay",
            "500",
        ])
        .unwrap();

        let mut config = ServerConfig::default();
        cli.apply_to(&mut config);

        assert_eq!(config.source, "cpu");
        assert_eq!(config.server.ip_address, "127.0.0.1");
        assert_eq!(config.server.port, 4321);
        assert_eq!(config.rate, 50.0);
        assert!(config.debug);
        assert_eq!(config.reconnect_delay, 500);
    }

    #[test]
    fn test_absent_flags_leave_config() {
        let cli = Cli::try_parse_from(["opengauge-server", "--config", "gauges.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gauges.json")));

        let mut config = ServerConfig::from_json(r#"{"source": "cpu", "debug": true}"#).unwrap();
        let before = config.clone();
        cli.apply_to(&mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["opengauge-server", "--port", "99999"]).is_err());
    }
}
