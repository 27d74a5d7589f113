use async_trait::async_trait;
use btleplug::{
    api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Adapter, Manager, Peripheral},
};
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::{
    sync::{mpsc, Mutex},
    time::{sleep, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{CurtainError, Result},
    transport::{CurtainLink, CurtainTransport},
    CURTAIN_NOTIFY_CHAR_UUID, CURTAIN_SERVICE_UUID, CURTAIN_WRITE_CHAR_UUID,
};

/// BLE central backed by the first available system Bluetooth adapter
pub struct BleCentral {
    adapter: Adapter,
}

impl BleCentral {
    /// Creates a central on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`CurtainError::Ble`] if the Bluetooth stack cannot be
    /// initialized, or [`CurtainError::DeviceNotFound`] if the host has
    /// no adapters.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(CurtainError::DeviceNotFound)?;

        Ok(Self { adapter })
    }

    async fn establish(&self, address: &str) -> Result<Box<dyn CurtainLink>> {
        const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

        let target = BDAddr::from_str_delim(address)
            .map_err(|e| CurtainError::Protocol(format!("Invalid device address: {e}")))?;

        let service_uuid = Uuid::parse_str(CURTAIN_SERVICE_UUID)
            .map_err(|e| CurtainError::Protocol(format!("Invalid service UUID: {e}")))?;
        let command_char_uuid = Uuid::parse_str(CURTAIN_WRITE_CHAR_UUID).map_err(|e| {
            CurtainError::Protocol(format!("Invalid command characteristic UUID: {e}"))
        })?;
        let notify_char_uuid = Uuid::parse_str(CURTAIN_NOTIFY_CHAR_UUID).map_err(|e| {
            CurtainError::Protocol(format!("Invalid notify characteristic UUID: {e}"))
        })?;

        debug!("Scanning for curtain {target}");

        self.adapter
            .start_scan(ScanFilter {
                services: vec![service_uuid],
            })
            .await?;

        let peripheral = loop {
            let peripherals = self.adapter.peripherals().await?;
            if let Some(found) = peripherals.into_iter().find(|p| p.address() == target) {
                break found;
            }
            sleep(SCAN_POLL_INTERVAL).await;
        };

        self.adapter.stop_scan().await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| CurtainError::Protocol("Curtain service not found".to_string()))?;

        let command_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == command_char_uuid)
            .ok_or_else(|| {
                CurtainError::Protocol("Command characteristic not found".to_string())
            })?
            .clone();

        let notify_char = service
            .characteristics
            .iter()
            .find(|c| c.uuid == notify_char_uuid)
            .ok_or_else(|| CurtainError::Protocol("Notify characteristic not found".to_string()))?
            .clone();

        peripheral.subscribe(&notify_char).await?;

        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_notifications(
            peripheral.clone(),
            notify_char,
            notification_tx,
        ));

        info!("Connected to curtain {target}");

        Ok(Box::new(BleLink {
            peripheral,
            command_char,
            notifications: Mutex::new(notification_rx),
        }))
    }
}

#[async_trait]
impl CurtainTransport for BleCentral {
    async fn connect(&self, address: &str, budget: Duration) -> Result<Box<dyn CurtainLink>> {
        match timeout(budget, self.establish(address)).await {
            Ok(link) => link,
            Err(_) => {
                // a scan may still be running when the budget elapses
                let _ = self.adapter.stop_scan().await;
                Err(CurtainError::Timeout {
                    timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

/// Live link to one curtain, subscribed to its notify characteristic
pub struct BleLink {
    peripheral: Peripheral,
    command_char: Characteristic,
    notifications: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl CurtainLink for BleLink {
    async fn write(&self, payload: &[u8]) -> Result<()> {
        debug!("Writing command: {payload:02X?}");

        self.peripheral
            .write(&self.command_char, payload, WriteType::WithoutResponse)
            .await
            .map_err(|e| CurtainError::TransientWrite(e.to_string()))
    }

    async fn next_notification(&self) -> Result<Vec<u8>> {
        self.notifications
            .lock()
            .await
            .recv()
            .await
            .ok_or(CurtainError::LinkLost)
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Pumps raw notification frames from the peripheral into the link's
/// channel. The sender drops when the stream ends, which surfaces as
/// [`CurtainError::LinkLost`] on the receiving side.
async fn forward_notifications(
    peripheral: Peripheral,
    notify_char: Characteristic,
    sender: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut notification_stream = match peripheral.notifications().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to open notification stream: {e}");
            return;
        }
    };

    while let Some(data) = notification_stream.next().await {
        if data.uuid == notify_char.uuid && sender.send(data.value).is_err() {
            break;
        }
    }

    debug!("Notification stream ended for {}", peripheral.address());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_parsing() {
        let service_uuid = Uuid::parse_str(CURTAIN_SERVICE_UUID);
        assert!(service_uuid.is_ok());

        let command_uuid = Uuid::parse_str(CURTAIN_WRITE_CHAR_UUID);
        assert!(command_uuid.is_ok());

        let notify_uuid = Uuid::parse_str(CURTAIN_NOTIFY_CHAR_UUID);
        assert!(notify_uuid.is_ok());
    }

    #[test]
    fn test_address_parsing() {
        let addr = BDAddr::from_str_delim("E6:A7:30:C9:2B:5D");
        assert!(addr.is_ok());

        let addr = BDAddr::from_str_delim("not an address");
        assert!(addr.is_err());
    }
}
