use serde_json::{json, Value};

/// Payload announcing the bridge or cover as reachable
pub const AVAILABILITY_ONLINE: &str = "online";

/// Payload announcing the bridge or cover as unreachable
pub const AVAILABILITY_OFFLINE: &str = "offline";

/// Command payload that opens the cover
pub const COMMAND_OPEN: &str = "OPEN";

/// Command payload that closes the cover
pub const COMMAND_CLOSE: &str = "CLOSE";

/// Command payload that halts the cover
pub const COMMAND_STOP: &str = "STOP";

/// Every topic the bridge publishes to or subscribes on, derived from
/// the discovery prefix, the base prefix and the bridge identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Retained Home Assistant discovery config for the cover
    pub cover_discovery: String,
    /// Retained Home Assistant discovery config for the battery sensor
    pub battery_discovery: String,
    /// Cover state, one of the public state labels
    pub state: String,
    /// Cover position, 0 to 100
    pub position: String,
    /// Flattened cover attributes as JSON
    pub attributes: String,
    /// Battery level in percent
    pub battery_state: String,
    /// Flattened battery attributes as JSON
    pub battery_attributes: String,
    /// Inbound open, close and stop commands
    pub set_command: String,
    /// Inbound position targets
    pub set_position: String,
    /// Bridge process reachability, also the last will topic
    pub bridge_availability: String,
    /// Device reachability, driven by command outcomes
    pub cover_availability: String,
}

impl TopicSet {
    /// Builds the topic tree for one bridge instance.
    #[must_use]
    pub fn new(discovery_prefix: &str, base_prefix: &str, client_id: &str) -> Self {
        Self {
            cover_discovery: format!("{discovery_prefix}/cover/{client_id}/cover/config"),
            battery_discovery: format!("{discovery_prefix}/sensor/{client_id}/sensor/config"),
            state: format!("{base_prefix}/{client_id}/cover/state"),
            position: format!("{base_prefix}/{client_id}/cover/position"),
            attributes: format!("{base_prefix}/{client_id}/cover/attributes"),
            battery_state: format!("{base_prefix}/{client_id}/battery/state"),
            battery_attributes: format!("{base_prefix}/{client_id}/battery/attributes"),
            set_command: format!("{base_prefix}/{client_id}/cover/set"),
            set_position: format!("{base_prefix}/{client_id}/cover/set_position"),
            bridge_availability: format!("{base_prefix}/{client_id}/bridge_availability"),
            cover_availability: format!("{base_prefix}/{client_id}/cover_availability"),
        }
    }

    /// Discovery payload for the cover entity.
    ///
    /// Availability mode is `all`: the entity shows unavailable unless
    /// both the bridge process and the device link are up.
    #[must_use]
    pub fn cover_discovery_payload(&self, client_id: &str) -> Value {
        json!({
            "availability": self.availability_block(),
            "availability_mode": "all",
            "device": device_block(client_id),
            "device_class": "curtain",
            "name": "SwitchBot Curtain",
            "unique_id": format!("{client_id}_cover_curtain2mqtt"),
            "command_topic": self.set_command,
            "state_topic": self.state,
            "position_topic": self.position,
            "set_position_topic": self.set_position,
            "json_attributes_topic": self.attributes,
            "optimistic": "false",
        })
    }

    /// Discovery payload for the battery sensor entity.
    #[must_use]
    pub fn battery_discovery_payload(&self, client_id: &str) -> Value {
        json!({
            "availability": self.availability_block(),
            "availability_mode": "all",
            "device": device_block(client_id),
            "device_class": "battery",
            "name": "SwitchBot Curtain Battery",
            "unique_id": format!("{client_id}_battery_curtain2mqtt"),
            "state_topic": self.battery_state,
            "json_attributes_topic": self.battery_attributes,
            "unit_of_measurement": "%",
        })
    }

    fn availability_block(&self) -> Value {
        json!([
            { "topic": self.bridge_availability },
            { "topic": self.cover_availability },
        ])
    }
}

fn device_block(client_id: &str) -> Value {
    json!({
        "identifiers": [format!("curtain2mqtt_{client_id}")],
        "manufacturer": "SwitchBot",
        "model": "Curtain",
        "name": "SwitchBot Curtain",
    })
}
