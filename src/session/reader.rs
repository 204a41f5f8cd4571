use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::SessionLifecycle;
use crate::error::ListenError;
use crate::event::{Event, EventSink};
use crate::frame::{self, Append, FrameAccumulator, RawFrame, FRAME_LENGTH};
use crate::transport::LinkReader;

/// Large enough that a read can return more than one frame, so an
/// oversized dump is seen as such instead of being split.
const READ_BUFFER_LENGTH: usize = FRAME_LENGTH * 2;

#[derive(Debug, Clone, Copy)]
pub struct ReadTiming {
    /// Longest a single read may wait before the stop token is checked again
    pub poll_interval: Duration,
    pub listen_timeout: Option<Duration>,
}

#[derive(Debug)]
pub enum ReadOutcome {
    Frame(RawFrame),
    /// The stop token was cancelled
    Stopped,
    Failed(ListenError),
}

/// Read from `reader` until one frame has been assembled, the stream turns
/// out to be malformed or broken, or `stop` is cancelled.
///
/// Each read races the stop token and is bounded by the poll interval. The
/// reader is handed back whatever the outcome.
pub async fn read_frame(
    mut reader: LinkReader,
    stop: &CancellationToken,
    timing: ReadTiming,
) -> (LinkReader, ReadOutcome) {
    let mut accumulator = FrameAccumulator::new();
    let mut chunk = [0u8; READ_BUFFER_LENGTH];
    let started = Instant::now();

    let outcome = loop {
        if stop.is_cancelled() {
            break ReadOutcome::Stopped;
        }
        if let Some(limit) = timing.listen_timeout {
            if started.elapsed() >= limit {
                break ReadOutcome::Failed(ListenError::Timeout(limit));
            }
        }

        let read = tokio::select! {
            biased;
            _ = stop.cancelled() => break ReadOutcome::Stopped,
            read = timeout(timing.poll_interval, reader.read(&mut chunk)) => read,
        };

        match read {
            // nothing available yet
            Err(_) => continue,
            Ok(Ok(0)) => break ReadOutcome::Failed(ListenError::EndOfStream),
            Ok(Ok(n)) => {
                debug!("RX: 0x{}", hex::encode(&chunk[..n]));
                match accumulator.append(&chunk[..n]) {
                    Append::Incomplete => {}
                    Append::Complete(frame) => break ReadOutcome::Frame(frame),
                    Append::Overflow { received } => {
                        break ReadOutcome::Failed(ListenError::Overflow { received })
                    }
                }
            }
            Ok(Err(err)) => break ReadOutcome::Failed(ListenError::Read(err)),
        }
    };

    (reader, outcome)
}

/// Body of the read task: wait for the frame, publish what came of it, then
/// tear the session down.
pub(super) async fn listen(
    lifecycle: Arc<SessionLifecycle>,
    reader: LinkReader,
    timing: ReadTiming,
) -> Option<LinkReader> {
    let address = lifecycle.address().clone();
    let (reader, outcome) = read_frame(reader, lifecycle.stop_token(), timing).await;

    let result = match outcome {
        ReadOutcome::Frame(frame) => frame::decode(&frame, &address).map_err(ListenError::from),
        ReadOutcome::Stopped => {
            debug!(%address, "read task stopped");
            return lifecycle.finish_listening(reader).await;
        }
        ReadOutcome::Failed(err) => Err(err),
    };

    match result {
        Ok(measurement) => {
            debug!(
                %address,
                volt = measurement.voltage,
                amp = measurement.current,
                mw = measurement.power_mw,
                temp_c = measurement.temperature_c,
                temp_f = measurement.temperature_f,
                "frame decoded"
            );
            lifecycle.sink().publish(Event::DataRetrieved(measurement));
        }
        Err(err) => {
            warn!(%address, "{err}");
            lifecycle
                .sink()
                .publish(Event::error(err.to_string(), Some(&address)));
        }
    }

    lifecycle.finish_listening(reader).await
}
