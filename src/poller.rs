//! Periodic polling of a list of meters, one session at a time.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PollerConfig, SessionConfig};
use crate::event::{Event, EventSink};
use crate::session::StreamSession;
use crate::transport::Connector;

pub struct Poller<C> {
    connector: C,
    sink: Arc<dyn EventSink>,
    session: SessionConfig,
    poller: PollerConfig,
}

impl<C: Connector + Clone> Poller<C> {
    pub fn new(
        connector: C,
        sink: Arc<dyn EventSink>,
        session: SessionConfig,
        poller: PollerConfig,
    ) -> Self {
        Self {
            connector,
            sink,
            session,
            poller,
        }
    }

    /// Poll every configured device once, in order. Returns how many
    /// sessions got as far as listening.
    pub async fn poll_once(&self) -> usize {
        self.poll_devices(&CancellationToken::new()).await
    }

    /// Poll until `stop` is cancelled. A session still open when that
    /// happens is closed before this returns.
    pub async fn run(&self, stop: CancellationToken) {
        info!(every = ?self.poller.interval(), "polling {}", self.poller.devices);
        loop {
            self.poll_devices(&stop).await;
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = sleep(self.poller.interval()) => {}
            }
        }
        info!("polling stopped");
    }

    async fn poll_devices(&self, stop: &CancellationToken) -> usize {
        let devices = self.poller.device_addresses();
        if devices.is_empty() {
            error!("No devices in settings");
            self.sink.publish(Event::error("No devices in settings", None));
            return 0;
        }
        if !self.poller.enabled {
            warn!("Service disabled in settings");
            self.sink.publish(Event::error("Service disabled in settings", None));
            return 0;
        }

        let mut listened = 0;
        for address in devices {
            if stop.is_cancelled() {
                break;
            }
            let session = StreamSession::new(
                self.connector.clone(),
                address,
                self.sink.clone(),
                self.session.clone(),
            );
            tokio::select! {
                _ = stop.cancelled() => {
                    session.close().await;
                    break;
                }
                ok = self.poll_device(&session) => {
                    if ok {
                        listened += 1;
                    }
                }
            }
        }
        listened
    }

    /// One session from connect to close. Returns whether it got as far as
    /// listening.
    async fn poll_device(&self, session: &StreamSession<C>) -> bool {
        let address = session.address();
        if let Err(err) = session.retrieve_data().await {
            error!(%address, "{err}");
            self.sink.publish(Event::error(err.to_string(), Some(address)));
            return false;
        }

        if self.session.listen_timeout().is_some() {
            session.closed().await;
        } else if timeout(self.poller.session_grace(), session.closed())
            .await
            .is_err()
        {
            debug!(%address, "no data within {:?}, closing", self.poller.session_grace());
            session.close().await;
        }
        true
    }
}
