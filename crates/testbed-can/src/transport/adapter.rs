//! CAN transport trait

use std::time::Duration;

use async_trait::async_trait;
use testbed_core::CanFrame;

use super::TransportError;

/// Send and receive whole CAN / CAN-FD frames on one interface
///
/// Implementations are shared between tasks behind an `Arc`, so both methods
/// take `&self`.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Put one frame on the bus
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next frame
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError>;

    /// Interface this transport is bound to
    fn interface(&self) -> &str;
}
