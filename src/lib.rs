#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Ergolink 🚴
//!
//! A Rust library for talking to Bluetooth Low Energy cycling hardware
//! (smart trainers, power meters, heart-rate straps and cadence sensors)
//! and for driving them through structured workouts.
//!
//! Ergolink covers the whole indoor-training loop:
//!
//! - **Discovery**: scan for nearby fitness hardware, filtered to the four
//!   standard GATT services, and classify each result into a [`TrainerType`].
//! - **Telemetry**: connect to one device, subscribe to its measurement
//!   characteristics and receive a stream of decoded [`RealTimeData`]
//!   samples (power, cadence, heart rate).
//! - **Control**: push target-power (ERG) commands to a smart trainer
//!   through the Fitness Machine Control Point.
//! - **Workouts**: run a plan of typed [`WorkoutStep`]s on a wall clock,
//!   converting FTP-relative intensities into watts and keeping the
//!   trainer's resistance in sync with the active step.
//!
//! Only the standard Bluetooth SIG services are spoken here (Cycling Power,
//! Heart Rate, Fitness Machine, Cycling Speed & Cadence). There is no
//! vendor-proprietary protocol support and no pairing/bonding UI; the
//! platform BLE stack is reached through `btleplug`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ergolink::{ConnectionManager, TrainerScanner};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Find the first device in range
//!     let scanner = TrainerScanner::new().await?;
//!     let mut devices = scanner.scan().await?;
//!     let device = devices.next().await.ok_or("no trainer found")?;
//!
//!     // Connect and stream telemetry
//!     let manager = ConnectionManager::new().await?;
//!     let mut telemetry = manager.connect(&device).await?;
//!
//!     // Ask for 200 W and watch the numbers
//!     manager.set_target_power(200).await;
//!     while let Some(sample) = telemetry.next().await {
//!         println!("{sample}");
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Device classification from advertisement data
pub mod classify;
/// Telemetry codec for standard GATT measurement payloads
pub mod codec;
/// Connection lifecycle and the live telemetry stream
pub mod connection;
/// Error types and handling
pub mod error;
/// BLE discovery of fitness hardware
pub mod scanner;
/// Type definitions and data structures
pub mod types;
/// Workout session sequencing and ERG control
pub mod workout;

// Re-export the main types for convenient usage
pub use connection::{ConnectionManager, PowerTarget, TelemetryStream};
pub use error::{Result, TrainerError};
pub use scanner::{DiscoveryStream, TrainerScanner};
pub use types::{
    ConnectionState, RealTimeData, TrainerDevice, TrainerType, WorkoutSession, WorkoutStep,
};
pub use workout::WorkoutSequencer;

use uuid::Uuid;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Cycling Power Service (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement characteristic (0x2A63)
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Service (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement characteristic (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Service (0x1826)
pub const FITNESS_MACHINE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point characteristic (0x2AD9)
///
/// Writable command channel of a smart trainer; ergolink uses it for the
/// Set Target Power opcode (`0x05`) only.
pub const FITNESS_MACHINE_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed & Cadence Service (0x1816)
pub const CYCLING_SPEED_CADENCE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// Client Characteristic Configuration Descriptor (0x2902)
///
/// Written with the enable-notifications value when subscribing to a
/// measurement characteristic. `btleplug` performs the descriptor write as
/// part of [`subscribe`](btleplug::api::Peripheral::subscribe); the constant
/// is kept public for callers that inspect descriptors themselves.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_0080_5f9b_34fb);
