//! Byte stream links to a meter.
//!
//! A [`Connector`] opens a [`Link`] to a [`DeviceAddress`]. How the link is
//! discovered, paired or routed is up to the connector; the session only
//! sees an ordered byte stream in each direction.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::warn;

use crate::error::ConnectError;
use crate::measurement::DeviceAddress;

pub mod ble;
#[cfg(test)]
pub(crate) mod mock;
pub mod sim;

pub type LinkReader = Box<dyn AsyncRead + Send + Unpin>;
pub type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Releases whatever connection sits beneath a [`Link`]'s streams
#[async_trait]
pub trait LinkHandle: Send {
    async fn close(&mut self) -> io::Result<()>;
}

/// An open byte stream to a device
pub struct Link {
    pub reader: LinkReader,
    pub writer: LinkWriter,
    pub handle: Box<dyn LinkHandle>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Make one attempt at opening a stream to `address`
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError>;
}

#[async_trait]
impl<C: Connector + ?Sized> Connector for Arc<C> {
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError> {
        (**self).open_stream(address).await
    }
}

/// Tries `primary`, then `secondary` if the primary could not reach the
/// device. A transport that is unavailable altogether is not retried.
pub struct Fallback<P, S> {
    primary: P,
    secondary: S,
}

impl<P, S> Fallback<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl<P: Connector, S: Connector> Connector for Fallback<P, S> {
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError> {
        match self.primary.open_stream(address).await {
            Ok(link) => Ok(link),
            Err(err @ ConnectError::Unavailable(_)) => Err(err),
            Err(err) => {
                warn!(%address, "primary connection failed, trying fallback: {err:#}");
                self.secondary.open_stream(address).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;

    #[tokio::test]
    async fn test_fallback_used_when_primary_unreachable() {
        let primary = MockConnector::unreachable();
        let secondary = MockConnector::new(vec![]);
        let connector = Fallback::new(primary.clone(), secondary.clone());

        assert!(connector.open_stream(&"AA".into()).await.is_ok());
        assert_eq!(primary.counters().opens(), 1);
        assert_eq!(secondary.counters().opens(), 1);
    }

    #[tokio::test]
    async fn test_fallback_skipped_when_transport_unavailable() {
        let primary = MockConnector::unavailable();
        let secondary = MockConnector::new(vec![]);
        let connector = Fallback::new(primary, secondary.clone());

        let err = connector.open_stream(&"AA".into()).await.err().unwrap();
        assert!(matches!(err, ConnectError::Unavailable(_)));
        assert_eq!(secondary.counters().opens(), 0);
    }

    #[tokio::test]
    async fn test_fallback_not_used_when_primary_succeeds() {
        let primary = MockConnector::new(vec![]);
        let secondary = MockConnector::new(vec![]);
        let connector = Fallback::new(primary, secondary.clone());

        assert!(connector.open_stream(&"AA".into()).await.is_ok());
        assert_eq!(secondary.counters().opens(), 0);
    }
}
