//! Discovery of BLE fitness hardware.
//!
//! [`TrainerScanner::scan`] drives the platform scan, filtered to the four
//! standard fitness service UUIDs, and yields classified [`TrainerDevice`]s
//! as advertisements arrive. The same hardware address may be re-emitted
//! with an updated signal strength; deduplication is the consumer's call
//! (see [`TrainerDevice::supersedes`]).
//!
//! Dropping the [`DiscoveryStream`] stops the radio scan. A scan that is
//! never cancelled stops itself after [`SCAN_WINDOW`].

use btleplug::{
    api::{Central as _, CentralEvent, CentralState, Manager as _, Peripheral as _,
        PeripheralProperties, ScanFilter},
    platform::Manager,
};
use futures::stream::{Stream, StreamExt};
use std::{
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    classify::classify_advertisement,
    error::{Result, TrainerError},
    types::TrainerDevice,
    CYCLING_POWER_SERVICE_UUID, CYCLING_SPEED_CADENCE_SERVICE_UUID, FITNESS_MACHINE_SERVICE_UUID,
    HEART_RATE_SERVICE_UUID,
};

/// How long an uncancelled scan keeps the radio busy before stopping itself
pub const SCAN_WINDOW: Duration = Duration::from_secs(15);

/// Scanner for BLE fitness hardware
///
/// Each call to [`scan`](Self::scan) starts a fresh hardware scan; streams
/// from earlier calls keep draining whatever was already queued but receive
/// nothing new once their scan stops.
pub struct TrainerScanner {
    manager: Manager,
}

impl TrainerScanner {
    /// Create a new scanner
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError::Ble`] if the Bluetooth session cannot be
    /// initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Start a discovery scan and stream classified devices
    ///
    /// Fails fast before touching the radio when the preconditions do not
    /// hold; these are not retryable until the environment changes.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError::AdapterUnavailable`] if the host has no
    /// Bluetooth adapter, [`TrainerError::AdapterDisabled`] if the radio is
    /// powered off, or [`TrainerError::Ble`] if starting the scan fails.
    pub async fn scan(&self) -> Result<DiscoveryStream> {
        let adapters = self.manager.adapters().await?;
        let central = adapters
            .into_iter()
            .next()
            .ok_or(TrainerError::AdapterUnavailable)?;

        if central.adapter_state().await? != CentralState::PoweredOn {
            return Err(TrainerError::AdapterDisabled);
        }

        let mut events = central.events().await?;

        central
            .start_scan(ScanFilter {
                services: vec![
                    CYCLING_POWER_SERVICE_UUID,
                    FITNESS_MACHINE_SERVICE_UUID,
                    HEART_RATE_SERVICE_UUID,
                    CYCLING_SPEED_CADENCE_SERVICE_UUID,
                ],
            })
            .await?;
        info!("Started BLE scan for fitness devices");

        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let window = tokio::time::sleep(SCAN_WINDOW);
            tokio::pin!(window);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("Discovery stream cancelled");
                        break;
                    }
                    () = &mut window => {
                        info!("Scan window elapsed");
                        break;
                    }
                    event = events.next() => {
                        let Some(event) = event else { break };
                        let (CentralEvent::DeviceDiscovered(id)
                            | CentralEvent::DeviceUpdated(id)) = event
                        else {
                            continue;
                        };

                        let properties = match central.peripheral(&id).await {
                            Ok(peripheral) => peripheral.properties().await.ok().flatten(),
                            Err(e) => {
                                debug!("Peripheral lookup failed: {e}");
                                None
                            }
                        };

                        if let Some(device) =
                            properties.as_ref().and_then(device_from_properties)
                        {
                            debug!(%device, "Discovered fitness device");
                            if device_tx.send(device).is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            // Release action: the radio must not keep scanning after the
            // consumer stops listening.
            if let Err(e) = central.stop_scan().await {
                warn!("Failed to stop BLE scan: {e}");
            } else {
                info!("Stopped BLE scan");
            }
        });

        Ok(DiscoveryStream {
            receiver: device_rx,
            stop: Some(stop_tx),
        })
    }
}

/// Build a [`TrainerDevice`] from advertisement properties
///
/// Returns `None` when the advertisement matches no known fitness
/// signature; such scan results are discarded.
fn device_from_properties(properties: &PeripheralProperties) -> Option<TrainerDevice> {
    let r#type =
        classify_advertisement(&properties.services, properties.local_name.as_deref())?;

    Some(TrainerDevice::new(
        properties.address.to_string(),
        properties
            .local_name
            .clone()
            .unwrap_or_else(|| "Unknown Device".to_string()),
        r#type,
        properties.rssi.unwrap_or(0),
    ))
}

/// Stream of devices found by an active scan
///
/// Ends when the scan window elapses or the stream is dropped; dropping it
/// stops the underlying radio scan.
pub struct DiscoveryStream {
    receiver: mpsc::UnboundedReceiver<TrainerDevice>,
    stop: Option<oneshot::Sender<()>>,
}

impl Stream for DiscoveryStream {
    type Item = TrainerDevice;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for DiscoveryStream {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrainerType;

    fn properties(
        services: Vec<uuid::Uuid>,
        name: Option<&str>,
        rssi: Option<i16>,
    ) -> PeripheralProperties {
        PeripheralProperties {
            services,
            local_name: name.map(str::to_string),
            rssi,
            ..PeripheralProperties::default()
        }
    }

    #[test]
    fn test_device_from_classified_advertisement() {
        let props = properties(
            vec![HEART_RATE_SERVICE_UUID],
            Some("Polar H10 12345"),
            Some(-58),
        );
        let device = device_from_properties(&props).unwrap();

        assert_eq!(device.r#type, TrainerType::HeartRateMonitor);
        assert_eq!(device.name, "Polar H10 12345");
        assert_eq!(device.signal_strength, -58);
    }

    #[test]
    fn test_unclassified_advertisement_is_dropped() {
        let props = properties(vec![], Some("Treadmill"), Some(-40));
        assert!(device_from_properties(&props).is_none());
    }

    #[test]
    fn test_missing_name_gets_placeholder() {
        let props = properties(vec![FITNESS_MACHINE_SERVICE_UUID], None, None);
        let device = device_from_properties(&props).unwrap();

        assert_eq!(device.name, "Unknown Device");
        assert_eq!(device.r#type, TrainerType::SmartTrainer);
        assert_eq!(device.signal_strength, 0);
    }

    #[tokio::test]
    async fn test_stream_drains_queued_devices_then_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, _stop_rx) = oneshot::channel();
        let mut stream = DiscoveryStream {
            receiver: rx,
            stop: Some(stop_tx),
        };

        let device = TrainerDevice::new(
            "AA:BB:CC:DD:EE:FF".into(),
            "KICKR".into(),
            TrainerType::SmartTrainer,
            -50,
        );
        tx.send(device.clone()).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(device));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_signals_stop() {
        let (_tx, rx) = mpsc::unbounded_channel::<TrainerDevice>();
        let (stop_tx, stop_rx) = oneshot::channel();
        let stream = DiscoveryStream {
            receiver: rx,
            stop: Some(stop_tx),
        };

        drop(stream);
        assert!(stop_rx.await.is_ok());
    }
}
