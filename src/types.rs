use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, time::Duration};

/// Motion reported by the curtain motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    /// Motor is not running
    Static = 0,
    /// Curtain is moving towards the closed end
    Closing = 1,
    /// Curtain is moving towards the open end
    Opening = 2,
}

impl MotionStatus {
    /// Decodes the two motion bits of a state frame. Returns `None` for
    /// the reserved index 3.
    #[must_use]
    pub const fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Static),
            1 => Some(Self::Closing),
            2 => Some(Self::Opening),
            _ => None,
        }
    }

    /// Returns the motion with the travel direction swapped. `Static`
    /// maps to itself.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Static => Self::Static,
            Self::Closing => Self::Opening,
            Self::Opening => Self::Closing,
        }
    }
}

impl fmt::Display for MotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Closing => write!(f, "closing"),
            Self::Opening => write!(f, "opening"),
        }
    }
}

/// Charging source reported in the advanced status page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    /// Battery is discharging
    NotCharging = 0,
    /// Charging from the USB adapter
    ChargingByAdapter = 1,
    /// Charging from the solar panel
    ChargingBySolar = 2,
    /// Full while the adapter is attached
    AdapterFullyCharged = 3,
    /// Full while the solar panel is attached
    SolarFullyCharged = 4,
    /// Solar panel attached but not delivering charge
    SolarNotCharging = 5,
    /// Charger fault
    ChargingError = 6,
}

impl ChargeState {
    /// Decodes the charge byte of an advanced status page. Returns
    /// `None` for indexes outside the published table.
    #[must_use]
    pub const fn from_index(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotCharging),
            1 => Some(Self::ChargingByAdapter),
            2 => Some(Self::ChargingBySolar),
            3 => Some(Self::AdapterFullyCharged),
            4 => Some(Self::SolarFullyCharged),
            5 => Some(Self::SolarNotCharging),
            6 => Some(Self::ChargingError),
            _ => None,
        }
    }

    /// Returns true if the USB adapter is attached in this state.
    #[must_use]
    pub const fn is_adapter(self) -> bool {
        matches!(self, Self::ChargingByAdapter | Self::AdapterFullyCharged)
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCharging => write!(f, "not_charging"),
            Self::ChargingByAdapter => write!(f, "charging_by_adapter"),
            Self::ChargingBySolar => write!(f, "charging_by_solar"),
            Self::AdapterFullyCharged => write!(f, "adapter_fully_charged"),
            Self::SolarFullyCharged => write!(f, "solar_fully_charged"),
            Self::SolarNotCharging => write!(f, "solar_not_charging"),
            Self::ChargingError => write!(f, "charging_error"),
        }
    }
}

/// Externally visible cover state, after orientation inversion has been
/// applied. These are the labels published to the state topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    /// Resting at or near the open end
    Open,
    /// Resting at or near the closed end
    Closed,
    /// Travelling towards open
    Opening,
    /// Travelling towards closed
    Closing,
}

impl fmt::Display for CoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Opening => write!(f, "opening"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// Flags packed into the low nibble of byte 5 of a primary state frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFlags {
    /// Solar panel attached
    pub is_solar_panel_connected: bool,
    /// Travel limits have been calibrated
    pub is_calibrated: bool,
    /// Current motor motion
    pub motion_status: MotionStatus,
}

/// Decoded primary state frame. All values are raw device bytes with no
/// scaling applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryState {
    /// Response status byte
    pub response_status: u8,
    /// Battery level in percent
    pub battery_percentage: u8,
    /// Firmware version byte
    pub firmware_version: u8,
    /// Number of chained curtain units
    pub device_chain_length: u8,
    /// Raw state byte 4, not further decoded
    pub state_1: u8,
    /// Decoded flag nibble of byte 5
    pub state_2: StateFlags,
    /// Position in device orientation, 0 to 100
    pub position: u8,
    /// Number of configured timers
    pub number_of_timers: u8,
}

impl PrimaryState {
    /// Flattens the state into dotted attribute keys for publishing.
    ///
    /// `public_position` and `public_motion` are the orientation-adjusted
    /// values; the remaining fields are passed through raw.
    #[must_use]
    pub fn attributes(&self, public_position: u8, public_motion: MotionStatus) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("response_status".into(), self.response_status.into());
        map.insert(
            "battery_percentage".into(),
            self.battery_percentage.into(),
        );
        map.insert("firmware_version".into(), self.firmware_version.into());
        map.insert(
            "device_chain_length".into(),
            self.device_chain_length.into(),
        );
        map.insert("state_1".into(), self.state_1.into());
        map.insert(
            "state_2.is_solar_panel_connected".into(),
            self.state_2.is_solar_panel_connected.into(),
        );
        map.insert(
            "state_2.is_calibrated".into(),
            self.state_2.is_calibrated.into(),
        );
        map.insert(
            "state_2.motion_status".into(),
            public_motion.to_string().into(),
        );
        map.insert("position".into(), public_position.into());
        map.insert("number_of_timers".into(), self.number_of_timers.into());
        map
    }
}

/// Decoded advanced status page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedState {
    /// Response status byte
    pub response_status: u8,
    /// Battery level in percent
    pub battery_percentage: u8,
    /// Firmware version byte
    pub firmware_version: u8,
    /// Charging source
    pub state_of_charge: ChargeState,
}

impl AdvancedState {
    /// Flattens the page into attribute keys for publishing.
    #[must_use]
    pub fn attributes(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("response_status".into(), self.response_status.into());
        map.insert(
            "battery_percentage".into(),
            self.battery_percentage.into(),
        );
        map.insert("firmware_version".into(), self.firmware_version.into());
        map.insert(
            "state_of_charge".into(),
            self.state_of_charge.to_string().into(),
        );
        map.insert(
            "is_adapter_connect".into(),
            self.state_of_charge.is_adapter().into(),
        );
        map
    }
}

/// Last decoded state of each kind, absent until the first matching
/// frame arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Most recent primary state frame
    pub primary: Option<PrimaryState>,
    /// Most recent advanced status page
    pub advanced: Option<AdvancedState>,
}

/// Connection parameters for device sessions
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Budget for a single connect attempt in milliseconds
    pub connect_timeout_ms: u64,
    /// Pause between failed connect attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            retry_backoff_ms: 1_000,
        }
    }
}

impl ConnectionParams {
    /// Connect attempt budget as a [`Duration`]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry pause as a [`Duration`]
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Polling cadence for the state fetch loops
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollConfig {
    /// Base state fetch period in milliseconds
    pub fetch_interval_ms: u64,
    /// Idle periods to skip between standby fetches
    pub standby_periods: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            fetch_interval_ms: 1_000,
            standby_periods: 20,
        }
    }
}

impl PollConfig {
    /// Base fetch period as a [`Duration`]
    #[must_use]
    pub const fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    /// Period between advanced page fetches
    #[must_use]
    pub const fn advanced_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms * self.standby_periods as u64)
    }

    /// Delay before the first advanced page fetch
    #[must_use]
    pub const fn advanced_start_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms * self.standby_periods as u64 / 2)
    }
}

/// Cadence of the bridge maintenance loops
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BridgeTiming {
    /// Broker health check period in milliseconds
    pub ping_interval_ms: u64,
    /// Inbound message poll period in milliseconds
    pub message_poll_interval_ms: u64,
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self {
            ping_interval_ms: 2_000,
            message_poll_interval_ms: 200,
        }
    }
}

impl BridgeTiming {
    /// Health check period as a [`Duration`]
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Message poll period as a [`Duration`]
    #[must_use]
    pub const fn message_poll_interval(&self) -> Duration {
        Duration::from_millis(self.message_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_status_from_index() {
        assert_eq!(MotionStatus::from_index(0), Some(MotionStatus::Static));
        assert_eq!(MotionStatus::from_index(1), Some(MotionStatus::Closing));
        assert_eq!(MotionStatus::from_index(2), Some(MotionStatus::Opening));
        assert_eq!(MotionStatus::from_index(3), None);
    }

    #[test]
    fn test_motion_status_reversed() {
        assert_eq!(MotionStatus::Static.reversed(), MotionStatus::Static);
        assert_eq!(MotionStatus::Closing.reversed(), MotionStatus::Opening);
        assert_eq!(MotionStatus::Opening.reversed(), MotionStatus::Closing);
    }

    #[test]
    fn test_charge_state_from_index() {
        assert_eq!(ChargeState::from_index(0), Some(ChargeState::NotCharging));
        assert_eq!(
            ChargeState::from_index(3),
            Some(ChargeState::AdapterFullyCharged)
        );
        assert_eq!(
            ChargeState::from_index(6),
            Some(ChargeState::ChargingError)
        );
        assert_eq!(ChargeState::from_index(7), None);
        assert_eq!(ChargeState::from_index(255), None);
    }

    #[test]
    fn test_charge_state_adapter_detection() {
        assert!(ChargeState::ChargingByAdapter.is_adapter());
        assert!(ChargeState::AdapterFullyCharged.is_adapter());
        assert!(!ChargeState::NotCharging.is_adapter());
        assert!(!ChargeState::ChargingBySolar.is_adapter());
        assert!(!ChargeState::SolarFullyCharged.is_adapter());
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(MotionStatus::Static.to_string(), "static");
        assert_eq!(MotionStatus::Opening.to_string(), "opening");
        assert_eq!(CoverState::Open.to_string(), "open");
        assert_eq!(CoverState::Closed.to_string(), "closed");
        assert_eq!(
            ChargeState::ChargingByAdapter.to_string(),
            "charging_by_adapter"
        );
    }

    #[test]
    fn test_primary_attributes_flattening() {
        let state = PrimaryState {
            response_status: 1,
            battery_percentage: 95,
            firmware_version: 45,
            device_chain_length: 1,
            state_1: 0,
            state_2: StateFlags {
                is_solar_panel_connected: true,
                is_calibrated: true,
                motion_status: MotionStatus::Closing,
            },
            position: 30,
            number_of_timers: 2,
        };

        let attrs = state.attributes(70, MotionStatus::Opening);
        assert_eq!(attrs["battery_percentage"], 95);
        assert_eq!(attrs["state_2.is_solar_panel_connected"], true);
        assert_eq!(attrs["state_2.is_calibrated"], true);
        assert_eq!(attrs["state_2.motion_status"], "opening");
        assert_eq!(attrs["position"], 70);
        assert_eq!(attrs["number_of_timers"], 2);
        assert_eq!(attrs.len(), 10);
    }

    #[test]
    fn test_advanced_attributes_flattening() {
        let state = AdvancedState {
            response_status: 1,
            battery_percentage: 88,
            firmware_version: 45,
            state_of_charge: ChargeState::AdapterFullyCharged,
        };

        let attrs = state.attributes();
        assert_eq!(attrs["battery_percentage"], 88);
        assert_eq!(attrs["state_of_charge"], "adapter_fully_charged");
        assert_eq!(attrs["is_adapter_connect"], true);
        assert_eq!(attrs.len(), 5);
    }

    #[test]
    fn test_default_timings() {
        let params = ConnectionParams::default();
        assert_eq!(params.connect_timeout_ms, 30_000);
        assert_eq!(params.retry_backoff_ms, 1_000);

        let poll = PollConfig::default();
        assert_eq!(poll.fetch_interval(), Duration::from_secs(1));
        assert_eq!(poll.advanced_interval(), Duration::from_secs(20));
        assert_eq!(poll.advanced_start_delay(), Duration::from_secs(10));

        let timing = BridgeTiming::default();
        assert_eq!(timing.ping_interval(), Duration::from_secs(2));
        assert_eq!(timing.message_poll_interval(), Duration::from_millis(200));
    }
}
