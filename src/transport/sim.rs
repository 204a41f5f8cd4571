//! An in-process meter for running without hardware.
//!
//! The simulated device answers every data dump request with a frame carrying
//! fixed readings and ignores the other control bytes.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Connector, Link, LinkHandle};
use crate::error::ConnectError;
use crate::frame::{self, FRAME_LENGTH};
use crate::measurement::DeviceAddress;
use crate::session::Command;

#[derive(Debug, Clone)]
pub struct SimulatedConnector {
    voltage_cv: u16,
    current_ma: u16,
    temperature_c: i16,
}

impl SimulatedConnector {
    pub fn new(voltage_cv: u16, current_ma: u16, temperature_c: i16) -> Self {
        Self {
            voltage_cv,
            current_ma,
            temperature_c,
        }
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(1260, 1000, 30)
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError> {
        debug!(%address, "opening simulated meter");
        let (local, remote) = tokio::io::duplex(FRAME_LENGTH * 4);
        let dump = frame::encode(self.voltage_cv, self.current_ma, self.temperature_c);
        let device = tokio::spawn(run_device(remote, dump.as_bytes().to_vec()));

        let (reader, writer) = tokio::io::split(local);
        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(writer),
            handle: Box::new(SimulatedHandle { device }),
        })
    }
}

async fn run_device(mut stream: DuplexStream, dump: Vec<u8>) -> io::Result<()> {
    let mut command = [0u8; 1];
    loop {
        if stream.read(&mut command).await? == 0 {
            return Ok(());
        }
        debug!("SIM: RX command 0x{}", hex::encode(command));
        if command[0] == Command::DataDump.byte() {
            stream.write_all(&dump).await?;
        }
    }
}

struct SimulatedHandle {
    device: JoinHandle<io::Result<()>>,
}

#[async_trait]
impl LinkHandle for SimulatedHandle {
    async fn close(&mut self) -> io::Result<()> {
        self.device.abort();
        Ok(())
    }
}
