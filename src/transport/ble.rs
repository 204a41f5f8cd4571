//! Serial link over Bluetooth Low Energy.
//!
//! Bluetooth meters that do not speak RFCOMM usually expose the Nordic UART
//! service instead: bytes written to one characteristic go to the device,
//! bytes from the device arrive as notifications on another. This adapter
//! turns that pair into an ordered byte stream by pumping both directions
//! through an in-memory duplex pipe.

use std::io;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bluest::{Adapter, AdvertisingDevice, Characteristic, Device, Uuid};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{Connector, Link, LinkHandle};
use crate::error::ConnectError;
use crate::measurement::DeviceAddress;

/// Opens links to meters by their advertised BLE name
#[derive(Debug, Clone)]
pub struct BleUartConnector {
    scan_timeout: Duration,
}

impl BleUartConnector {
    const NORDIC_UART_SERVICE_ID: &'static str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
    const NORDIC_UART_WRITE_CHARACTERISTIC_ID: &'static str =
        "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
    const NORDIC_UART_NOTIFY_CHARACTERISTIC_ID: &'static str =
        "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
    // Room for a few frames in each direction
    const PIPE_CAPACITY: usize = 1024;
    // Largest write without negotiating a bigger MTU
    const MAX_WRITE: usize = 20;

    pub fn new(scan_timeout: Duration) -> Self {
        Self { scan_timeout }
    }

    async fn discover_device(name: &str, adapter: &Adapter) -> anyhow::Result<AdvertisingDevice> {
        let required_services = [Self::nordic_uart_service_id()];
        let mut adapter_events = adapter.scan(&required_services).await?;
        while let Some(device) = adapter_events.next().await {
            let device_name = device.device.name_async().await?;
            if device_name == name {
                return Ok(device);
            }
        }

        Err(anyhow!("Device not found"))
    }

    async fn connect(
        &self,
        adapter: &Adapter,
        address: &DeviceAddress,
    ) -> anyhow::Result<(Device, Characteristic, Characteristic)> {
        let device = timeout(self.scan_timeout, Self::discover_device(address.as_str(), adapter))
            .await
            .map_err(|_| anyhow!("Device not found"))??;

        adapter.connect_device(&device.device).await?;

        let nordic_uart_service = device
            .device
            .discover_services_with_uuid(Self::nordic_uart_service_id())
            .await?
            .first()
            .ok_or(anyhow!("The specified device does not support the Nordic UART service."))?
            .clone();
        let write = nordic_uart_service
            .discover_characteristics_with_uuid(Self::nordic_uart_write_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not support the Nordic UART write characterstic."
            ))?
            .clone();
        let notify = nordic_uart_service
            .discover_characteristics_with_uuid(Self::nordic_uart_notify_characteristic_id())
            .await?
            .first()
            .ok_or(anyhow!(
                "The specified device does not support the Nordic UART notify characterstic."
            ))?
            .clone();

        Ok((device.device, write, notify))
    }

    fn nordic_uart_service_id() -> Uuid {
        Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e)
    }

    fn nordic_uart_write_characteristic_id() -> Uuid {
        Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e)
    }

    fn nordic_uart_notify_characteristic_id() -> Uuid {
        Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e)
    }
}

#[async_trait]
impl Connector for BleUartConnector {
    async fn open_stream(&self, address: &DeviceAddress) -> Result<Link, ConnectError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| ConnectError::Unavailable("Default adapter not found".to_owned()))?;
        adapter
            .wait_available()
            .await
            .map_err(|err| ConnectError::Unavailable(err.to_string()))?;

        debug!(%address, "Connecting");
        let (device, write, notify) = self
            .connect(&adapter, address)
            .await
            .map_err(|err| ConnectError::unreachable(address, err))?;

        let (local, remote) = tokio::io::duplex(Self::PIPE_CAPACITY);
        let pump = tokio::spawn(pump(remote, write, notify));
        let (reader, writer) = tokio::io::split(local);

        Ok(Link {
            reader: Box::new(reader),
            writer: Box::new(writer),
            handle: Box::new(BleHandle {
                adapter,
                device,
                pump,
            }),
        })
    }
}

/// Forward writes on the pipe to the write characteristic and
/// notifications to the pipe, until either side ends.
async fn pump(
    mut pipe: DuplexStream,
    write: Characteristic,
    notify: Characteristic,
) -> anyhow::Result<()> {
    let mut notifications = notify.notify().await?;
    let mut outgoing = [0u8; BleUartConnector::MAX_WRITE];
    loop {
        tokio::select! {
            n = pipe.read(&mut outgoing) => {
                let n = n?;
                if n == 0 {
                    return Ok(());
                }
                write.write(&outgoing[..n]).await?;
            }
            notification = notifications.next() => match notification {
                Some(Ok(data)) => pipe.write_all(&data).await?,
                Some(Err(err)) => {
                    warn!("Notification error: {err}");
                    return Err(err.into());
                }
                None => {
                    debug!("End of notification stream");
                    return Ok(());
                }
            }
        }
    }
}

struct BleHandle {
    adapter: Adapter,
    device: Device,
    pump: JoinHandle<anyhow::Result<()>>,
}

#[async_trait]
impl LinkHandle for BleHandle {
    async fn close(&mut self) -> io::Result<()> {
        self.pump.abort();
        if !self.device.is_connected().await {
            debug!("device already disconnected");
            return Ok(());
        }
        self.adapter
            .disconnect_device(&self.device)
            .await
            .map_err(io::Error::other)
    }
}

#[test]
fn test_service_ids_match_nordic_uart() {
    assert_eq!(
        BleUartConnector::nordic_uart_service_id().to_string(),
        BleUartConnector::NORDIC_UART_SERVICE_ID
    );
    assert_eq!(
        BleUartConnector::nordic_uart_write_characteristic_id().to_string(),
        BleUartConnector::NORDIC_UART_WRITE_CHARACTERISTIC_ID
    );
    assert_eq!(
        BleUartConnector::nordic_uart_notify_characteristic_id().to_string(),
        BleUartConnector::NORDIC_UART_NOTIFY_CHARACTERISTIC_ID
    );
}
