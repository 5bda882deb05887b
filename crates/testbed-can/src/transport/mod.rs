//! Raw CAN transports
//!
//! - SocketCAN transport on a (v)can interface (Linux only)
//! - Mock transport for testing
//!
//! # Example
//!
//! ```ignore
//! use testbed_can::{open_interface, CanTransport};
//! use testbed_core::CanFrame;
//!
//! let bus = open_interface("vcan0").await?;
//! bus.send(&CanFrame::new(0x43, &[0xFF, 0, 0, 0, 0, 0, 0, 0])?).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::CanTransport;
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport based on configuration
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Arc<dyn CanTransport>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let transport = socketcan::SocketCanTransport::open(cfg).await?;
            Ok(Arc::new(transport))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let transport = mock::MockCanTransport::open(cfg)?;
            Ok(Arc::new(transport))
        }
    }
}

/// Open a raw SocketCAN transport on `interface` with default settings
pub async fn open_interface(interface: &str) -> Result<Arc<dyn CanTransport>, TransportError> {
    create_transport(&TransportConfig::socketcan(interface)).await
}
