//! Read voltage, current and temperature from UM24C/UM25C style USB power
//! meters over a Bluetooth serial link.
//!
//! The meters speak a very small protocol. After connecting, a few single
//! byte commands are written (backlight, screen timeout, then "dump data")
//! and the meter answers with one 130 byte record. There is no header length,
//! delimiter or checksum, so a record is complete when exactly 130 bytes have
//! been received.
//!
//! A [`StreamSession`] performs one such exchange against one device and
//! reports what happened as [`Event`]s on an [`EventSink`]:
//!
//! - [`Event::DataRetrieved`] with the decoded [`Measurement`]
//! - [`Event::Error`] when the record was malformed or could not be read
//! - [`Event::ConnectionClosed`] once the link has been released
//!
//! # Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use meterread::{Event, SessionConfig, StreamSession};
//! # use meterread::transport::sim::SimulatedConnector;
//! #
//! # #[tokio::main]
//! # pub async fn main(){
//!     let (sink, mut events) = tokio::sync::mpsc::unbounded_channel::<Event>();
//!     let session = StreamSession::new(
//!         SimulatedConnector::default(),
//!         "UM24C".into(),
//!         Arc::new(sink),
//!         SessionConfig::default(),
//!     );
//!     session.retrieve_data().await.unwrap();
//!     session.closed().await;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{}: {:?}", event.kind(), event.fields());
//!     }
//! # }
//! ```

pub mod config;
mod error;
mod event;
pub mod frame;
mod measurement;
pub mod poller;
pub mod session;
pub mod transport;

pub use config::{Config, PollerConfig, SessionConfig};
pub use error::{CommandWriteError, ConnectError, DecodeError, ListenError, SessionError};
pub use event::{Event, EventSink, TracingSink};
pub use measurement::{DeviceAddress, Measurement};
pub use poller::Poller;
pub use session::{Command, SessionLifecycle, SessionState, StreamSession};
