#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # curtain2mqtt
//!
//! A bridge exposing SwitchBot Curtain devices to Home Assistant over MQTT.
//!
//! The bridge holds a long-lived Bluetooth Low Energy session to one
//! curtain, polls it for state and battery pages, and republishes every
//! change to retained MQTT topics. Home Assistant picks the cover and its
//! battery sensor up through MQTT discovery; `OPEN`/`CLOSE`/`STOP` and
//! position commands flow back through the same broker onto the device.
//!
//! ## Protocol Notes
//!
//! The curtain speaks SwitchBot's published BLE API:
//!
//! - **Service Discovery**: a single communication service carrying one
//!   write and one notify characteristic
//! - **Command Format**: `0x57`-prefixed write frames for state fetches,
//!   movement and halt
//! - **State Frames**: 8-byte primary frames with battery, firmware,
//!   position and motion flags
//! - **Advanced Pages**: shorter status pages carrying the charging state
//!
//! Device quirks the bridge smooths over: frames arrive shorter than
//! their nominal length and are zero-padded before decoding, the first
//! state frame after a movement command can still echo the pre-move
//! state, and a session handle silently goes stale after hours of uptime
//! and has to be rebuilt from scratch.
//!
//! ## Quick Start
//!
//! ```no_run
//! use curtain2mqtt::{AlwaysConnected, BleCentral, BridgeSettings, CurtainBridge, RumqttcClient};
//! use std::{path::Path, sync::Arc};
//!
//! #[tokio::main]
//! async fn main() -> curtain2mqtt::Result<()> {
//!     let settings = BridgeSettings::load(Path::new("config.json"))?;
//!
//!     let client = Arc::new(RumqttcClient::new(
//!         settings.mqtt.clone(),
//!         settings.client_id.clone(),
//!     ));
//!     let transport = Arc::new(BleCentral::new().await?);
//!
//!     let bridge = CurtainBridge::new(client, transport, Arc::new(AlwaysConnected), &settings);
//!     bridge.connect(true).await;
//!     bridge.run().await;
//!
//!     Ok(())
//! }
//! ```

/// Bluetooth Low Energy transport implementation
pub mod ble;
/// Bridge orchestrator tying the device session to the broker
pub mod bridge;
/// Configuration file loading
pub mod config;
/// Device session and reconnect handling
pub mod device;
/// Error types and handling
pub mod error;
/// MQTT messaging client
pub mod mqtt;
mod poll;
/// Frame codec for the curtain's BLE protocol
pub mod protocol;
/// Topic layout and Home Assistant discovery payloads
pub mod topics;
/// Transport seam between the session and the BLE stack
pub mod transport;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use ble::BleCentral;
pub use bridge::{AlwaysConnected, CurtainBridge, NetworkMonitor};
pub use config::{BridgeSettings, DeviceSettings, MqttSettings};
pub use device::{CurtainDevice, SessionEvents, StateUpdate};
pub use error::{CurtainError, Result};
pub use mqtt::{MessageCallback, MessagingClient, RumqttcClient};
pub use topics::TopicSet;
pub use transport::{CurtainLink, CurtainTransport};
pub use types::{
    AdvancedState, BridgeTiming, ChargeState, ConnectionParams, CoverState, DeviceSnapshot,
    MotionStatus, PollConfig, PrimaryState, StateFlags,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SwitchBot communication service UUID
///
/// Every SwitchBot BLE product exposes this service as the carrier for
/// its command and notification characteristics. The curtain advertises
/// it during scanning, which is how the bridge filters the device out of
/// a crowded radio neighbourhood.
pub const CURTAIN_SERVICE_UUID: &str = "cba20d00-224d-11e6-9fb8-0002a5d5c51b";

/// Write characteristic UUID for host-to-curtain commands
///
/// All command frames are written here without response, following the
/// message format documented in SwitchBot's published BLE API.
pub const CURTAIN_WRITE_CHAR_UUID: &str = "cba20002-224d-11e6-9fb8-0002a5d5c51b";

/// Notify characteristic UUID for curtain-to-host state frames
///
/// The curtain answers state and advanced status fetches with
/// notifications on this characteristic. The bridge keeps a subscription
/// open for the whole life of the session.
pub const CURTAIN_NOTIFY_CHAR_UUID: &str = "cba20003-224d-11e6-9fb8-0002a5d5c51b";
