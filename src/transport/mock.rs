//! Scripted connector for tests. Records what the session wrote and counts
//! every release.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{Connector, Link, LinkHandle};
use crate::error::ConnectError;
use crate::measurement::DeviceAddress;

/// What the device does on each read. Once the script runs out the device
/// goes silent.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Data(Vec<u8>),
    Fail,
    Eof,
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unavailable,
    Unreachable,
}

#[derive(Default)]
pub(crate) struct Counters {
    opens: AtomicUsize,
    writer_shutdowns: AtomicUsize,
    reader_drops: AtomicUsize,
    handle_closes: AtomicUsize,
    written: Mutex<Vec<u8>>,
    releases: Mutex<Vec<&'static str>>,
}

impl Counters {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn writer_shutdowns(&self) -> usize {
        self.writer_shutdowns.load(Ordering::SeqCst)
    }

    pub fn reader_drops(&self) -> usize {
        self.reader_drops.load(Ordering::SeqCst)
    }

    pub fn handle_closes(&self) -> usize {
        self.handle_closes.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    /// Order in which writer, reader and handle were released
    pub fn releases(&self) -> Vec<&'static str> {
        self.releases.lock().unwrap().clone()
    }

    fn released(&self, what: &'static str, counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
        self.releases.lock().unwrap().push(what);
    }
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    steps: Vec<Step>,
    failure: Option<Failure>,
    fail_writes: bool,
    open_delay: Duration,
    close_delay: Duration,
    counters: Arc<Counters>,
}

impl MockConnector {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self::scripted(chunks.into_iter().map(Step::Data).collect())
    }

    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps,
            failure: None,
            fail_writes: false,
            open_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            counters: Arc::default(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            failure: Some(Failure::Unavailable),
            ..Self::new(vec![])
        }
    }

    pub fn unreachable() -> Self {
        Self {
            failure: Some(Failure::Unreachable),
            ..Self::new(vec![])
        }
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Take this long to connect, or to fail connecting
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Take this long to close the link handle
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        match self.failure {
            Some(Failure::Unavailable) => {
                return Err(ConnectError::Unavailable("Bluetooth not enabled".to_owned()))
            }
            Some(Failure::Unreachable) => {
                return Err(ConnectError::unreachable(
                    address,
                    io::Error::new(io::ErrorKind::TimedOut, "page timeout"),
                ))
            }
            None => {}
        }

        Ok(Link {
            reader: Box::new(ScriptedReader {
                steps: self.steps.clone().into(),
                counters: self.counters.clone(),
            }),
            writer: Box::new(RecordingWriter {
                fail: self.fail_writes,
                counters: self.counters.clone(),
            }),
            handle: Box::new(CountingHandle {
                delay: self.close_delay,
                counters: self.counters.clone(),
            }),
        })
    }
}

struct ScriptedReader {
    steps: VecDeque<Step>,
    counters: Arc<Counters>,
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match this.steps.pop_front() {
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                if n < data.len() {
                    this.steps.push_front(Step::Data(data.split_off(n)));
                }
                Poll::Ready(Ok(()))
            }
            Some(Step::Fail) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "link lost",
            ))),
            Some(Step::Eof) => Poll::Ready(Ok(())),
            // silent device; the session's poll interval wakes the reader
            None => Poll::Pending,
        }
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.counters.released("reader", &self.counters.reader_drops);
    }
}

struct RecordingWriter {
    fail: bool,
    counters: Arc<Counters>,
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed")));
        }
        self.counters.written.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.counters.released("writer", &self.counters.writer_shutdowns);
        Poll::Ready(Ok(()))
    }
}

struct CountingHandle {
    delay: Duration,
    counters: Arc<Counters>,
}

#[async_trait]
impl LinkHandle for CountingHandle {
    async fn close(&mut self) -> io::Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.counters.released("handle", &self.counters.handle_closes);
        Ok(())
    }
}
