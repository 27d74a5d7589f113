use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Factory for device links.
///
/// A single `connect` call covers the whole establishment sequence:
/// scanning for the address, transport connection, GATT discovery and
/// notification subscription. The returned link is live and delivering
/// notifications when the call resolves.
#[async_trait]
pub trait CurtainTransport: Send + Sync {
    /// Establishes a link to the device at `address`, bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CurtainError::Timeout`](crate::CurtainError::Timeout)
    /// when the budget elapses, or any transport error raised while
    /// establishing.
    async fn connect(&self, address: &str, timeout: Duration) -> Result<Box<dyn CurtainLink>>;
}

/// An established, subscribed link to one curtain device.
///
/// Links are single-use. Once [`next_notification`] reports
/// [`CurtainError::LinkLost`](crate::CurtainError::LinkLost) the link is
/// dead and a replacement must be obtained from the transport.
///
/// [`next_notification`]: CurtainLink::next_notification
#[async_trait]
pub trait CurtainLink: Send + Sync {
    /// Writes a command payload to the device.
    ///
    /// # Errors
    ///
    /// Returns
    /// [`CurtainError::TransientWrite`](crate::CurtainError::TransientWrite)
    /// when the write is refused while the link is still believed alive.
    async fn write(&self, payload: &[u8]) -> Result<()>;

    /// Suspends until the device pushes the next notification frame.
    ///
    /// # Errors
    ///
    /// Returns [`CurtainError::LinkLost`](crate::CurtainError::LinkLost)
    /// once the link drops and no further frames will arrive.
    async fn next_notification(&self) -> Result<Vec<u8>>;

    /// Tears the link down.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport rejects the
    /// disconnect. The link must be considered dead either way.
    async fn disconnect(&self) -> Result<()>;
}
