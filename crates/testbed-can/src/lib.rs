//! testbed-can - Raw CAN access for the testbed
//!
//! Attacks, the sniffer and the frame logger all talk to the bus through the
//! [`CanTransport`] trait. On Linux with the `socketcan` feature the real
//! transport opens a raw CAN-FD socket on a (v)can interface; the mock
//! transport records traffic in memory for tests.
//!
//! ```text
//!   attack / sniffer / logger
//!              │
//!      ┌───────┴────────┐
//!      │  CanTransport  │
//!      └───────┬────────┘
//!        ┌─────┴──────┐
//!   SocketCanTransport  MockCanTransport
//!     (vcan0 / vcan1)     (in memory)
//! ```

pub mod config;
pub mod logger;
pub mod transport;

pub use config::{select_interface, MockConfig, SocketCanConfig, TransportConfig};
pub use logger::CanLogger;
pub use transport::{create_transport, open_interface, CanTransport, TransportError};
pub use transport::mock::MockCanTransport;
