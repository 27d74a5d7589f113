use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker hostname or IP address
    pub host: String,
    /// Broker port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username, if the broker requires credentials
    #[serde(default)]
    pub username: Option<String>,
    /// Password, if the broker requires credentials
    #[serde(default)]
    pub password: Option<String>,
    /// Keepalive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl MqttSettings {
    /// Keepalive interval as a [`Duration`]
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Curtain device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Bluetooth address of the curtain, colon separated
    pub address: String,
    /// Set when the device is mounted in reverse orientation
    #[serde(default)]
    pub inverted: bool,
}

/// Complete bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Broker connection settings
    pub mqtt: MqttSettings,
    /// Curtain device settings
    pub device: DeviceSettings,
    /// Identifier of this bridge, used in topics and as the broker
    /// client id
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Root of the bridge's own topic tree
    #[serde(default = "default_base_prefix")]
    pub base_prefix: String,
    /// Home Assistant discovery prefix
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

impl BridgeSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CurtainError::Io`](crate::CurtainError::Io) if the file
    /// cannot be read, or
    /// [`CurtainError::Json`](crate::CurtainError::Json) if it does not
    /// parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&raw)?;
        Ok(settings)
    }
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    5
}

fn default_client_id() -> String {
    "curtain".to_string()
}

fn default_base_prefix() -> String {
    "curtain2mqtt".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_settings_parse() {
        let raw = r#"{
            "mqtt": {
                "host": "broker.local",
                "port": 8883,
                "username": "bridge",
                "password": "secret",
                "keep_alive_secs": 10
            },
            "device": {
                "address": "E6:A7:30:C9:2B:5D",
                "inverted": true
            },
            "client_id": "livingroom",
            "base_prefix": "covers",
            "discovery_prefix": "ha"
        }"#;

        let settings: BridgeSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.mqtt.host, "broker.local");
        assert_eq!(settings.mqtt.port, 8883);
        assert_eq!(settings.mqtt.username.as_deref(), Some("bridge"));
        assert_eq!(settings.mqtt.keep_alive(), Duration::from_secs(10));
        assert_eq!(settings.device.address, "E6:A7:30:C9:2B:5D");
        assert!(settings.device.inverted);
        assert_eq!(settings.client_id, "livingroom");
        assert_eq!(settings.base_prefix, "covers");
        assert_eq!(settings.discovery_prefix, "ha");
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let raw = r#"{
            "mqtt": { "host": "broker.local" },
            "device": { "address": "E6:A7:30:C9:2B:5D" }
        }"#;

        let settings: BridgeSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.username, None);
        assert_eq!(settings.mqtt.keep_alive(), Duration::from_secs(5));
        assert!(!settings.device.inverted);
        assert_eq!(settings.client_id, "curtain");
        assert_eq!(settings.base_prefix, "curtain2mqtt");
        assert_eq!(settings.discovery_prefix, "homeassistant");
    }

    #[test]
    fn test_missing_required_fields_fail() {
        let raw = r#"{ "mqtt": { "host": "broker.local" } }"#;
        assert!(serde_json::from_str::<BridgeSettings>(raw).is_err());

        let raw = r#"{
            "mqtt": {},
            "device": { "address": "E6:A7:30:C9:2B:5D" }
        }"#;
        assert!(serde_json::from_str::<BridgeSettings>(raw).is_err());
    }
}
