//! Lifecycle events and the sinks they are published to.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::measurement::{DeviceAddress, Measurement};

/// Something that happened during a session
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DataRetrieved(Measurement),
    Error {
        message: String,
        address: Option<DeviceAddress>,
    },
    /// The session released its link. Published exactly once per session.
    ConnectionClosed { address: DeviceAddress },
}

impl Event {
    pub const DATA_RETRIEVED: &'static str = "DATA_RETRIEVED";
    pub const ERROR: &'static str = "ERROR";
    pub const CLOSE_CONNECTION: &'static str = "CLOSE_CONNECTION";

    pub fn error(message: impl Into<String>, address: Option<&DeviceAddress>) -> Self {
        Self::Error {
            message: message.into(),
            address: address.cloned(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataRetrieved(_) => Self::DATA_RETRIEVED,
            Self::Error { .. } => Self::ERROR,
            Self::ConnectionClosed { .. } => Self::CLOSE_CONNECTION,
        }
    }

    /// The event flattened to string fields, for sinks that forward events
    /// to a bus or broker.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            Self::DataRetrieved(m) => {
                fields.insert("device".to_owned(), m.address.to_string());
                fields.insert("volt".to_owned(), m.voltage.to_string());
                fields.insert("amp".to_owned(), m.current.to_string());
                fields.insert("powerMilliwatts".to_owned(), m.power_mw.to_string());
                fields.insert("tempC".to_owned(), m.temperature_c.to_string());
                fields.insert("tempF".to_owned(), m.temperature_f.to_string());
                fields.insert("timestamp".to_owned(), m.formatted_timestamp());
                fields.insert("message".to_owned(), m.message());
            }
            Self::Error { message, address } => {
                fields.insert("message".to_owned(), message.clone());
                if let Some(address) = address {
                    fields.insert("device".to_owned(), address.to_string());
                }
            }
            Self::ConnectionClosed { address } => {
                fields.insert("device".to_owned(), address.to_string());
            }
        }
        fields
    }
}

/// Receives events from sessions. Must not block and must tolerate
/// concurrent calls; publishing happens from the background read task.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn publish(&self, event: Event) {
        (**self).publish(event)
    }
}

impl EventSink for mpsc::UnboundedSender<Event> {
    fn publish(&self, event: Event) {
        // a dropped receiver just means nobody is listening any more
        let _ = self.send(event);
    }
}

impl EventSink for broadcast::Sender<Event> {
    fn publish(&self, event: Event) {
        let _ = self.send(event);
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: Event) {
        let kind = event.kind();
        match &event {
            Event::Error { .. } => warn!(kind, fields = ?event.fields()),
            _ => info!(kind, fields = ?event.fields()),
        }
    }
}
