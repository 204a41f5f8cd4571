//! Configuration, loaded from TOML. Every field has a default so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [session]
//! settle_pause_ms = 100
//! poll_interval_ms = 20
//! # listen_timeout_ms = 10000
//!
//! [poller]
//! devices = "UM24C, UM25C-2"
//! interval_secs = 90
//!
//! [transport]
//! kind = "ble"
//! scan_timeout_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::measurement::DeviceAddress;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub poller: PollerConfig,
    pub transport: TransportConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Timing of a single session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause the meter needs between control bytes
    pub settle_pause_ms: u64,
    /// Upper bound on one read attempt, and so on how long the read task
    /// takes to notice it has been stopped
    pub poll_interval_ms: u64,
    /// Give up listening when no complete frame arrived in this time.
    /// `None` listens until the session is closed from outside.
    pub listen_timeout_ms: Option<u64>,
}

impl SessionConfig {
    pub fn settle_pause(&self) -> Duration {
        Duration::from_millis(self.settle_pause_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn listen_timeout(&self) -> Option<Duration> {
        self.listen_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_pause_ms: 100,
            poll_interval_ms: 20,
            listen_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    pub enabled: bool,
    /// Comma separated device addresses
    pub devices: String,
    /// Time between poll cycles
    pub interval_secs: u64,
    /// How long to wait for a session to finish on its own before closing it
    pub session_grace_ms: u64,
}

impl PollerConfig {
    /// The configured addresses with whitespace removed, empty entries skipped
    pub fn device_addresses(&self) -> Vec<DeviceAddress> {
        self.devices
            .split(',')
            .map(|d| d.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|d| !d.is_empty())
            .map(DeviceAddress::new)
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn session_grace(&self) -> Duration {
        Duration::from_millis(self.session_grace_ms)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            devices: String::new(),
            interval_secs: 90,
            session_grace_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Ble,
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// How long to scan for the named device before giving up
    pub scan_timeout_secs: u64,
}

impl TransportConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Ble,
            scan_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse(
            r#"
            [session]
            listen_timeout_ms = 5000

            [poller]
            devices = " UM24C , ,AA:BB:CC "

            [transport]
            kind = "simulated"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.settle_pause(), Duration::from_millis(100));
        assert_eq!(config.session.listen_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.poller.device_addresses(),
            vec![DeviceAddress::new("UM24C"), DeviceAddress::new("AA:BB:CC")]
        );
        assert_eq!(config.poller.interval(), Duration::from_secs(90));
        assert_eq!(config.transport.kind, TransportKind::Simulated);
    }

    #[test]
    fn test_unknown_transport_rejected() {
        assert!(Config::parse("[transport]\nkind = \"usb\"").is_err());
    }
}
