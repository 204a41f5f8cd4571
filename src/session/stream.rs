use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::reader::ReadTiming;
use super::{Command, SessionLifecycle, SessionState};
use crate::config::SessionConfig;
use crate::error::{CommandWriteError, SessionError};
use crate::event::EventSink;
use crate::measurement::DeviceAddress;
use crate::transport::Connector;

/// A single poll of one meter.
///
/// [`retrieve_data`](Self::retrieve_data) opens the link, sends the command
/// sequence and starts the read task, then returns. The reading arrives
/// later as an [`Event`](crate::Event) on the sink. A session is used once;
/// poll again with a new one.
///
/// Dropping the session stops a read task that is still waiting for data.
/// Keep it until [`closed`](Self::closed) resolves.
pub struct StreamSession<C> {
    connector: C,
    config: SessionConfig,
    lifecycle: Arc<SessionLifecycle>,
}

impl<C: Connector> StreamSession<C> {
    pub fn new(
        connector: C,
        address: DeviceAddress,
        sink: Arc<dyn EventSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            connector,
            config,
            lifecycle: Arc::new(SessionLifecycle::new(address, sink)),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        self.lifecycle.address()
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.lifecycle.subscribe()
    }

    /// Run the whole session up to the point where the read task takes
    /// over. Any failure on the way closes the session before it is
    /// returned.
    pub async fn retrieve_data(&self) -> Result<(), SessionError> {
        let guard = CloseOnDrop(Some(self.lifecycle.clone()));
        let result = self.run().await;
        guard.disarm();
        if let Err(err) = &result {
            warn!(address = %self.address(), "retrieving data failed: {err}");
            self.close().await;
        }
        result
    }

    async fn run(&self) -> Result<(), SessionError> {
        self.open().await?;

        for command in Command::SEQUENCE {
            sleep(self.config.settle_pause()).await;
            if command == Command::DataDump {
                debug!(address = %self.address(), "Requesting data...");
            }
            // best effort: the meter may still answer the data dump
            if let Err(err) = self.send_command(command).await {
                warn!(address = %self.address(), "{err}: {}", err.source);
            }
        }

        self.start_listening().await?;
        sleep(self.config.settle_pause()).await;
        Ok(())
    }

    /// Idle → Connecting → Ready. A failure leaves the session Failed.
    pub async fn open(&self) -> Result<(), SessionError> {
        self.lifecycle.transition(SessionState::Connecting)?;
        debug!(address = %self.address(), "Connecting");

        let link = match self.connector.open_stream(self.address()).await {
            Ok(link) => link,
            Err(err) => {
                // a concurrent close may already have moved us to Closed
                let _ = self.lifecycle.transition(SessionState::Failed);
                return Err(err.into());
            }
        };
        self.lifecycle.attach(link).await?;
        self.lifecycle.transition(SessionState::Ready)?;
        debug!(address = %self.address(), "Connected");
        Ok(())
    }

    /// Write one control byte to the meter
    pub async fn send_command(&self, command: Command) -> Result<(), CommandWriteError> {
        debug!(
            address = %self.address(),
            "{} TX: 0x{}",
            command.label(),
            hex::encode([command.byte()])
        );
        self.lifecycle
            .write(&[command.byte()])
            .await
            .map_err(|source| CommandWriteError {
                label: command.label(),
                source,
            })
    }

    /// Ready → Listening, handing the input stream to the read task
    pub async fn start_listening(&self) -> Result<(), SessionError> {
        let timing = ReadTiming {
            poll_interval: self.config.poll_interval(),
            listen_timeout: self.config.listen_timeout(),
        };
        self.lifecycle.start_listening(timing).await
    }

    /// Stop listening and release the link. Idempotent.
    pub async fn close(&self) {
        self.lifecycle.close().await
    }

    /// Resolves once the session has released its link, by any path
    pub async fn closed(&self) {
        self.lifecycle.closed().await
    }
}

impl<C> Drop for StreamSession<C> {
    fn drop(&mut self) {
        self.lifecycle.stop_token().cancel();
        self.lifecycle.close_detached();
    }
}

/// Closes the session if `retrieve_data` is abandoned before the read task
/// has taken over.
struct CloseOnDrop(Option<Arc<SessionLifecycle>>);

impl CloseOnDrop {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(lifecycle) = self.0.take() {
            lifecycle.close_detached();
        }
    }
}
