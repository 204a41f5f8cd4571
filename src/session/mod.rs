//! One open → command → listen → close cycle against a single meter.

mod lifecycle;
mod reader;
mod stream;

pub use lifecycle::{SessionLifecycle, SessionState};
pub use reader::{read_frame, ReadOutcome, ReadTiming};
pub use stream::StreamSession;

/// Control bytes understood by the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetBacklight,
    SetScreenTimeout,
    /// Ask for one 130 byte data dump
    DataDump,
}

impl Command {
    /// The order in which a session sends its commands
    pub const SEQUENCE: [Command; 3] = [
        Command::SetBacklight,
        Command::SetScreenTimeout,
        Command::DataDump,
    ];

    pub const fn byte(self) -> u8 {
        match self {
            Command::SetBacklight => 0xd0,
            Command::SetScreenTimeout => 0xe0,
            Command::DataDump => 0xf0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Command::SetBacklight => "setBacklight",
            Command::SetScreenTimeout => "setScreenTimeout",
            Command::DataDump => "dataDump",
        }
    }
}
