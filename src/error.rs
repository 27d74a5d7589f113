use thiserror::Error;

/// Errors that can occur when talking to a curtain device or the
/// messaging broker.
#[derive(Error, Debug)]
pub enum CurtainError {
    /// Bluetooth communication error from the underlying BLE stack
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Connection attempt did not complete within the configured window
    #[error("Connection attempt timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// No matching curtain device was found during scanning
    #[error("Curtain device not found")]
    DeviceNotFound,

    /// An established link dropped mid-session
    #[error("Device link lost")]
    LinkLost,

    /// A write was attempted against a torn-down session handle
    #[error("Session handle is stale")]
    HandleStale,

    /// A write failed while the link itself is still believed alive
    #[error("Transient write failure: {0}")]
    TransientWrite(String),

    /// An inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// GATT discovery or address parsing failed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The messaging transport refused or dropped an operation
    #[error("Messaging transport unavailable: {0}")]
    TransportUnavailable(String),

    /// An inbound bridge payload could not be interpreted
    #[error("Malformed bridge payload: {0}")]
    BridgeParse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for curtain operations
pub type Result<T> = std::result::Result<T, CurtainError>;

impl CurtainError {
    /// Returns true if this error is related to establishing or keeping
    /// a device connection.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_)
                | Self::Timeout { .. }
                | Self::DeviceNotFound
                | Self::LinkLost
                | Self::HandleStale
        )
    }

    /// Returns true if the session must discard its handle and run a
    /// fresh connect cycle to recover.
    #[must_use]
    pub const fn triggers_reconnect(&self) -> bool {
        matches!(self, Self::LinkLost | Self::HandleStale)
    }

    /// Returns true if the error describes an undecodable payload that
    /// is dropped without touching the connection.
    #[must_use]
    pub const fn is_payload_error(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::BridgeParse(_))
    }
}
