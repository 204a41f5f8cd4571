//! The meter's 130 byte data dump and how it is assembled and decoded.

mod accumulator;
mod decoder;

pub use accumulator::{Append, FrameAccumulator};
pub use decoder::{decode, encode};

use crate::error::DecodeError;

/// Length in bytes of one data dump. There is no delimiter or checksum,
/// completeness is determined by byte count alone.
pub const FRAME_LENGTH: usize = 130;

/// Exactly one data dump, as received.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_LENGTH]);

impl RawFrame {
    pub const fn new(bytes: [u8; FRAME_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for RawFrame {
    type Error = DecodeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; FRAME_LENGTH] = bytes
            .try_into()
            .map_err(|_| DecodeError::Length(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawFrame({})", hex::encode(self.0))
    }
}
