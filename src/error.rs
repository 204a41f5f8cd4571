use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::frame::FRAME_LENGTH;
use crate::measurement::DeviceAddress;
use crate::session::SessionState;

/// The link to the device could not be established.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The transport itself is disabled or missing, e.g. no Bluetooth adapter.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("Unable to connect to {address}")]
    Unreachable {
        address: DeviceAddress,
        #[source]
        source: anyhow::Error,
    },
}

impl ConnectError {
    pub fn unreachable(address: &DeviceAddress, source: impl Into<anyhow::Error>) -> Self {
        Self::Unreachable {
            address: address.clone(),
            source: source.into(),
        }
    }
}

/// A control byte could not be written. Never fatal.
#[derive(Debug, Error)]
#[error("Error in {label}")]
pub struct CommandWriteError {
    pub label: &'static str,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame is {0} bytes, expected {expected}", expected = FRAME_LENGTH)]
    Length(usize),
    #[error("Unknown header: {} for device {address}", hex::encode(.header))]
    UnknownHeader {
        header: [u8; 2],
        address: DeviceAddress,
    },
}

/// Terminal conditions of the background read task.
#[derive(Debug, Error)]
pub enum ListenError {
    #[error(
        "malformed data from device: {received} bytes received, expected {expected}",
        expected = FRAME_LENGTH
    )]
    Overflow { received: usize },
    #[error("Error while listening")]
    Read(#[source] io::Error),
    #[error("end of stream")]
    EndOfStream,
    #[error("no data from device within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Returned to the caller of `StreamSession::retrieve_data`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error("session already closed")]
    AlreadyClosed,
    #[error("session cannot go from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}
