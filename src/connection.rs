//! Connection lifecycle for the single active device.
//!
//! The [`ConnectionManager`] owns the live GATT handle and its subscription
//! set exclusively; no other component writes characteristics. It is a
//! pass-through decoder: each inbound notification is dispatched to the
//! codec by characteristic UUID and the resulting partial sample is pushed
//! to the [`TelemetryStream`] unmerged.
//!
//! The manager never reconnects by itself. A mid-stream GATT error or a
//! device-initiated disconnect terminates the stream and surfaces as an
//! observable [`ConnectionState`] change; retry policy belongs to the
//! caller.

use async_trait::async_trait;
use btleplug::{
    api::{Central as _, CentralEvent, Characteristic, Manager as _, Peripheral as _, WriteType},
    platform::{Adapter, Manager, Peripheral},
};
use futures::stream::{Stream, StreamExt};
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    codec::{decode_notification, encode_set_target_power},
    error::{Result, TrainerError},
    types::{ConnectionState, RealTimeData, TrainerDevice},
    CYCLING_POWER_MEASUREMENT_UUID, CYCLING_POWER_SERVICE_UUID,
    FITNESS_MACHINE_CONTROL_POINT_UUID, FITNESS_MACHINE_SERVICE_UUID,
    HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID,
};

/// Command surface between the workout sequencer and the trainer
///
/// The sequencer drives resistance exclusively through this trait, so it
/// carries no BLE knowledge at all. [`ConnectionManager`] is the production
/// implementation; tests substitute a recording mock.
#[async_trait]
pub trait PowerTarget: Send + Sync {
    /// Request a target power in watts; `true` if the command was written
    async fn set_target_power(&self, watts: u16) -> bool;
}

/// The live GATT handle plus what was discovered on it
struct ActiveConnection {
    peripheral: Peripheral,
    control_point: Option<Characteristic>,
    router: Option<JoinHandle<()>>,
}

/// Owner of the single active trainer connection
///
/// At most one connection is `Connecting`/`Connected` at a time; calling
/// [`connect`](Self::connect) while one is active tears the prior one down
/// first.
pub struct ConnectionManager {
    manager: Manager,
    state_tx: watch::Sender<ConnectionState>,
    active: Arc<Mutex<Option<ActiveConnection>>>,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError::Ble`] if the Bluetooth session cannot be
    /// initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            manager,
            state_tx,
            active: Arc::new(Mutex::new(None)),
        })
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch connection-state transitions
    ///
    /// Transport failures surface here so callers can decide whether to
    /// reconnect.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connect to a discovered device and stream its telemetry
    ///
    /// Connects, discovers services, subscribes to the Cycling Power and
    /// Heart Rate measurement characteristics where the device offers them,
    /// and records the Fitness Machine Control Point for
    /// [`set_target_power`](Self::set_target_power). The returned stream
    /// ends on disconnection; dropping it disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`TrainerError::AdapterUnavailable`] without a Bluetooth
    /// adapter, [`TrainerError::DeviceNotFound`] if the device is no longer
    /// in range, or [`TrainerError::ConnectionFailed`] /
    /// [`TrainerError::Ble`] when the link cannot be established. Any
    /// failure leaves the state at [`ConnectionState::Error`].
    pub async fn connect(&self, device: &TrainerDevice) -> Result<TelemetryStream> {
        // Exclusive ownership of the GATT handle: one connection at a time.
        self.disconnect().await;

        info!(device = %device, "Connecting");
        self.state_tx.send_replace(ConnectionState::Connecting);

        match self.establish(device).await {
            Ok(stream) => {
                info!(device = %device.name, "Connected");
                Ok(stream)
            }
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Error);
                warn!(device = %device.name, "Connection failed: {e}");
                Err(e)
            }
        }
    }

    async fn establish(&self, device: &TrainerDevice) -> Result<TelemetryStream> {
        let adapters = self.manager.adapters().await?;
        let central = adapters
            .into_iter()
            .next()
            .ok_or(TrainerError::AdapterUnavailable)?;

        let mut peripheral = None;
        for candidate in central.peripherals().await? {
            if candidate.address().to_string() == device.id {
                peripheral = Some(candidate);
                break;
            }
        }
        let peripheral = peripheral.ok_or_else(|| TrainerError::DeviceNotFound(device.id.clone()))?;

        peripheral
            .connect()
            .await
            .map_err(|e| TrainerError::ConnectionFailed(e.to_string()))?;

        match self.attach(&central, &peripheral).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // The link is up but unusable; close it before surfacing
                // the error so no orphaned GATT handle survives.
                if let Err(close_err) = peripheral.disconnect().await {
                    debug!("Disconnect after failed setup: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// Wire up an already-connected peripheral
    ///
    /// Failures here leave the platform link open; the caller owns closing
    /// it.
    async fn attach(&self, central: &Adapter, peripheral: &Peripheral) -> Result<TelemetryStream> {
        peripheral.discover_services().await?;

        let mut control_point = None;
        for service in peripheral.services() {
            match service.uuid {
                CYCLING_POWER_SERVICE_UUID => {
                    if let Some(c) = find_characteristic(&service, CYCLING_POWER_MEASUREMENT_UUID) {
                        peripheral.subscribe(&c).await?;
                        debug!("Subscribed to cycling power measurement");
                    }
                }
                HEART_RATE_SERVICE_UUID => {
                    if let Some(c) = find_characteristic(&service, HEART_RATE_MEASUREMENT_UUID) {
                        peripheral.subscribe(&c).await?;
                        debug!("Subscribed to heart rate measurement");
                    }
                }
                FITNESS_MACHINE_SERVICE_UUID => {
                    control_point =
                        find_characteristic(&service, FITNESS_MACHINE_CONTROL_POINT_UUID);
                    if control_point.is_some() {
                        debug!("Fitness machine control point available");
                    }
                }
                _ => {}
            }
        }

        let mut notifications = peripheral.notifications().await?;
        let mut events = central.events().await?;

        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        {
            let mut guard = self.active.lock().await;
            *guard = Some(ActiveConnection {
                peripheral: peripheral.clone(),
                control_point,
                router: None,
            });
        }

        // Publish before the router exists: its release writes
        // `Disconnected`, and that write must never be overtaken by this
        // one.
        self.publish_connected();

        let peripheral = peripheral.clone();
        let peripheral_id = peripheral.id();
        let state_tx = self.state_tx.clone();
        let active = Arc::clone(&self.active);

        let router = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!("Telemetry stream cancelled");
                        break;
                    }
                    notification = notifications.next() => {
                        let Some(notification) = notification else {
                            warn!("Notification stream ended");
                            break;
                        };
                        let Some(sample) =
                            decode_notification(notification.uuid, &notification.value)
                        else {
                            continue;
                        };
                        if sample_tx.send(sample).is_err() {
                            break;
                        }
                    }
                    event = events.next() => {
                        match event {
                            Some(CentralEvent::DeviceDisconnected(id))
                                if id == peripheral_id =>
                            {
                                warn!("Device-initiated disconnect");
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
            }

            // Release action: close the handle and drop the subscription
            // set no matter which arm ended the loop. The end state is
            // always `Disconnected`, including when cancellation raced a
            // state transition.
            active.lock().await.take();
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect during release: {e}");
            }
            state_tx.send_replace(ConnectionState::Disconnected);
        });

        if let Some(conn) = self.active.lock().await.as_mut() {
            conn.router = Some(router);
        }

        Ok(TelemetryStream {
            receiver: sample_rx,
            cancel: Some(cancel_tx),
        })
    }

    /// Upgrade `Connecting` to `Connected`; any other state is left alone
    ///
    /// A connection that was already torn down (its router sent
    /// `Disconnected`) must not be resurrected by a late state write.
    fn publish_connected(&self) {
        self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        });
    }

    /// Request a target power (ERG) on the connected smart trainer
    ///
    /// Encodes the Set Target Power opcode and writes it to the Fitness
    /// Machine Control Point, fire-and-forget. Returns `false`, without
    /// raising an error, when no device is connected, the device has no
    /// control point, or the write fails.
    pub async fn set_target_power(&self, watts: u16) -> bool {
        if self.state() != ConnectionState::Connected {
            warn!(watts, "Target power rejected: not connected");
            return false;
        }

        let guard = self.active.lock().await;
        let Some(active) = guard.as_ref() else {
            return false;
        };
        let Some(control_point) = active.control_point.as_ref() else {
            warn!(watts, "Target power rejected: no control point on device");
            return false;
        };

        let command = encode_set_target_power(watts);
        match active
            .peripheral
            .write(control_point, &command, WriteType::WithoutResponse)
            .await
        {
            Ok(()) => {
                debug!(watts, "Sent target power command");
                true
            }
            Err(e) => {
                warn!(watts, "Target power write failed: {e}");
                false
            }
        }
    }

    /// Disconnect and release the GATT handle
    ///
    /// Safe to call at any time and any number of times, including
    /// concurrently with an in-flight connect attempt; always leaves the
    /// state at [`ConnectionState::Disconnected`].
    pub async fn disconnect(&self) {
        let taken = self.active.lock().await.take();
        if let Some(active) = taken {
            if let Some(router) = active.router {
                router.abort();
            }
            if let Err(e) = active.peripheral.disconnect().await {
                debug!("Disconnect: {e}");
            }
            info!("Disconnected");
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }
}

#[async_trait]
impl PowerTarget for ConnectionManager {
    async fn set_target_power(&self, watts: u16) -> bool {
        Self::set_target_power(self, watts).await
    }
}

fn find_characteristic(
    service: &btleplug::api::Service,
    uuid: uuid::Uuid,
) -> Option<Characteristic> {
    service
        .characteristics
        .iter()
        .find(|c| c.uuid == uuid)
        .cloned()
}

/// Stream of decoded telemetry samples from the connected device
///
/// Partial samples arrive in device-transmission order per characteristic;
/// nothing is guaranteed across characteristics. The stream is finite only
/// by disconnection or cancellation, and dropping it disconnects.
pub struct TelemetryStream {
    receiver: mpsc::UnboundedReceiver<RealTimeData>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Stream for TelemetryStream {
    type Item = RealTimeData;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrainerType;

    #[tokio::test]
    async fn test_connected_is_published_only_from_connecting() {
        let Ok(manager) = ConnectionManager::new().await else {
            return;
        };

        manager.state_tx.send_replace(ConnectionState::Connecting);
        manager.publish_connected();
        assert_eq!(manager.state(), ConnectionState::Connected);

        // A torn-down connection stays down; a late publish must not
        // resurrect it.
        manager.state_tx.send_replace(ConnectionState::Disconnected);
        manager.publish_connected();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.state_tx.send_replace(ConnectionState::Error);
        manager.publish_connected();
        assert_eq!(manager.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_no_active_handle() {
        let Ok(manager) = ConnectionManager::new().await else {
            return;
        };

        let ghost = TrainerDevice::new(
            "00:00:00:00:00:00".into(),
            "Ghost".into(),
            TrainerType::SmartTrainer,
            -90,
        );

        if manager.connect(&ghost).await.is_err() {
            assert!(manager.active.lock().await.is_none());
            assert_eq!(manager.state(), ConnectionState::Error);
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let Ok(manager) = ConnectionManager::new().await else {
            return;
        };

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_telemetry_stream_yields_samples_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, _cancel_rx) = oneshot::channel();
        let mut stream = TelemetryStream {
            receiver: rx,
            cancel: Some(cancel_tx),
        };

        let mut first = RealTimeData::empty();
        first.power = Some(180);
        let mut second = RealTimeData::empty();
        second.power = Some(185);

        tx.send(first).unwrap();
        tx.send(second).unwrap();
        drop(tx);

        assert_eq!(stream.next().await.unwrap().power, Some(180));
        assert_eq!(stream.next().await.unwrap().power, Some(185));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_telemetry_stream_signals_release() {
        let (_tx, rx) = mpsc::unbounded_channel::<RealTimeData>();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let stream = TelemetryStream {
            receiver: rx,
            cancel: Some(cancel_tx),
        };

        drop(stream);
        assert!(cancel_rx.await.is_ok());
    }
}
