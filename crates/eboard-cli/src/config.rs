//! Config file for the `eboard` binary

use anyhow::{Context, Result};
use eboard_bridge::TransportConfig;
use eboard_sync::LinkConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the binary can be configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub transport: TransportConfig,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid config file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, port: Option<String>, url: Option<String>) -> Self {
        if let Some(port) = port {
            self.transport.serial_port = port;
        }
        if let Some(url) = url {
            self.transport.websocket_url = url;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config = Config::from_json(
            r#"{"link": {"debounce_ms": 200}, "transport": {"serial_port": "/dev/ttyACM0"}}"#,
        )
        .unwrap();
        assert_eq!(config.link.debounce_ms, 200);
        assert_eq!(config.link.mismatch_grace_ms, 3_000);
        assert_eq!(config.transport.serial_port, "/dev/ttyACM0");
        assert_eq!(config.transport.baud_rate, 9600);
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::default().with_overrides(Some("COM3".into()), None);
        assert_eq!(config.transport.serial_port, "COM3");
        assert_eq!(config.transport.websocket_url, TransportConfig::default().websocket_url);
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/eboard.json")).is_err());
        assert!(Config::from_json("{").is_err());
    }
}
