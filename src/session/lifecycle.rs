use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::reader::{self, ReadTiming};
use crate::error::SessionError;
use crate::event::{Event, EventSink};
use crate::measurement::DeviceAddress;
use crate::transport::{Link, LinkHandle, LinkReader, LinkWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Ready,
    Listening,
    Closed,
    Failed,
}

impl SessionState {
    /// Closed and Failed sessions are spent
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Idle, Closed)
                | (Connecting, Ready)
                | (Connecting, Failed)
                | (Connecting, Closed)
                | (Ready, Listening)
                | (Ready, Closed)
                | (Listening, Closed)
        )
    }
}

#[derive(Default)]
struct Resources {
    writer: Option<LinkWriter>,
    /// Only held here until listening starts, then owned by the read task
    reader: Option<LinkReader>,
    handle: Option<Box<dyn LinkHandle>>,
    read_task: Option<JoinHandle<Option<LinkReader>>>,
}

/// State and teardown of one session, shared between the orchestrating
/// caller and the read task.
///
/// Teardown runs once: whichever of [`close`](Self::close) or the read task
/// finishing gets there first releases the link, later attempts do nothing.
pub struct SessionLifecycle {
    address: DeviceAddress,
    sink: Arc<dyn EventSink>,
    state: watch::Sender<SessionState>,
    released: watch::Sender<bool>,
    closing: AtomicBool,
    stop: CancellationToken,
    resources: Mutex<Resources>,
}

impl SessionLifecycle {
    pub fn new(address: DeviceAddress, sink: Arc<dyn EventSink>) -> Self {
        Self {
            address,
            sink,
            state: watch::channel(SessionState::Idle).0,
            released: watch::channel(false).0,
            closing: AtomicBool::new(false),
            stop: CancellationToken::new(),
            resources: Mutex::new(Resources::default()),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// The token observed by the read task
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    pub(crate) fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    pub fn transition(&self, next: SessionState) -> Result<(), SessionError> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_become(next) {
                *state = next;
                true
            } else {
                result = Err(if state.is_terminal() {
                    SessionError::AlreadyClosed
                } else {
                    SessionError::InvalidTransition {
                        from: *state,
                        to: next,
                    }
                });
                false
            }
        });
        result
    }

    /// Wait until teardown has completed
    pub async fn closed(&self) {
        let mut released = self.released.subscribe();
        // the sender lives as long as self, so this only returns once released
        let _ = released.wait_for(|released| *released).await;
    }

    /// Take ownership of a freshly opened link. A link arriving after the
    /// session was closed is released straight away.
    pub(crate) async fn attach(&self, link: Link) -> Result<(), SessionError> {
        let mut resources = self.resources.lock().await;
        if self.is_closing() {
            drop(resources);
            debug!(address = %self.address, "link opened after close, releasing it");
            Self::release_link(Some(link.writer), Some(link.reader), Some(link.handle)).await;
            return Err(SessionError::AlreadyClosed);
        }
        resources.writer = Some(link.writer);
        resources.reader = Some(link.reader);
        resources.handle = Some(link.handle);
        Ok(())
    }

    pub(crate) async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut resources = self.resources.lock().await;
        let writer = resources
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no output stream"))?;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Move Ready → Listening and spawn the read task
    pub(crate) async fn start_listening(
        self: &Arc<Self>,
        timing: ReadTiming,
    ) -> Result<(), SessionError> {
        let mut resources = self.resources.lock().await;
        if self.is_closing() {
            return Err(SessionError::AlreadyClosed);
        }
        let reader = resources
            .reader
            .take()
            .ok_or(SessionError::InvalidTransition {
                from: self.state(),
                to: SessionState::Listening,
            })?;
        if let Err(err) = self.transition(SessionState::Listening) {
            resources.reader = Some(reader);
            return Err(err);
        }

        // the task blocks on this lock until the handle is stored
        resources.read_task = Some(tokio::spawn(reader::listen(self.clone(), reader, timing)));
        Ok(())
    }

    /// Stop the read task and release the link. Safe to call any number of
    /// times, from any state. Returns once the link has been released, even
    /// when another caller is doing the releasing.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            debug!(address = %self.address, "session already closing");
            self.closed().await;
            return;
        }
        debug!(address = %self.address, "Try closing link...");
        self.stop.cancel();

        let read_task = self.resources.lock().await.read_task.take();
        let reader = match read_task {
            Some(task) => match task.await {
                Ok(reader) => reader,
                Err(err) => {
                    warn!(address = %self.address, "read task ended abnormally: {err}");
                    None
                }
            },
            None => None,
        };
        self.release(reader).await;
    }

    /// Close from a synchronous context, such as a drop, when no read task is
    /// there to notice the stop token.
    pub(crate) fn close_detached(self: &Arc<Self>) {
        if self.is_closing()
            || !matches!(self.state(), SessionState::Connecting | SessionState::Ready)
        {
            return;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                let lifecycle = self.clone();
                runtime.spawn(async move { lifecycle.close().await });
            }
            Err(_) => warn!(address = %self.address, "no runtime left to close the link on"),
        }
    }

    /// Called by the read task when it stops. Tears the session down unless
    /// a [`close`](Self::close) is already in progress, in which case the
    /// reader is handed back to it.
    pub(crate) async fn finish_listening(&self, reader: LinkReader) -> Option<LinkReader> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Some(reader);
        }
        self.stop.cancel();
        // our own handle, nothing to wait for
        drop(self.resources.lock().await.read_task.take());
        self.release(Some(reader)).await;
        None
    }

    async fn release(&self, reader: Option<LinkReader>) {
        let (writer, stored_reader, handle) = {
            let mut resources = self.resources.lock().await;
            (
                resources.writer.take(),
                resources.reader.take(),
                resources.handle.take(),
            )
        };
        Self::release_link(writer, reader.or(stored_reader), handle).await;

        self.sink.publish(Event::ConnectionClosed {
            address: self.address.clone(),
        });
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        });
        self.released.send_replace(true);
        debug!(address = %self.address, "link closed");
    }

    /// Output stream, input stream, then the connection beneath them
    async fn release_link(
        writer: Option<LinkWriter>,
        reader: Option<LinkReader>,
        handle: Option<Box<dyn LinkHandle>>,
    ) {
        if let Some(mut writer) = writer {
            match writer.shutdown().await {
                Ok(()) => debug!("output stream closed"),
                Err(err) => warn!("Error closing output stream: {err}"),
            }
        }
        if let Some(reader) = reader {
            drop(reader);
            debug!("input stream closed");
        }
        if let Some(mut handle) = handle {
            match handle.close().await {
                Ok(()) => debug!("connection closed"),
                Err(err) => warn!("Error closing connection: {err}"),
            }
        }
    }
}
