use std::fmt;

use chrono::{DateTime, Local};

/// Opaque identifier of the stream endpoint a session talks to.
///
/// For the BLE transport this is the advertised device name, for the
/// simulated meter it can be anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// A decoded reading from the meter
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// The device the reading came from
    pub address: DeviceAddress,
    /// Bus voltage in V
    pub voltage: f64,
    /// Current in A
    pub current: f64,
    /// voltage × current. Named after the meter's own power register,
    /// which is not used.
    pub power_mw: f64,
    /// Temperature in °C
    pub temperature_c: f64,
    /// Temperature in °F, derived from `temperature_c`
    pub temperature_f: f64,
    /// When the frame was decoded
    pub timestamp: DateTime<Local>,
}

impl Measurement {
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(Self::TIMESTAMP_FORMAT).to_string()
    }

    /// Short human readable summary, e.g. `UM24C 12.6v 25°`
    pub fn message(&self) -> String {
        format!("{} {}v {}°", self.address, self.voltage, self.temperature_c)
    }
}
