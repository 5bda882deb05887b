//! Integration tests for the CAN testbed
//!
//! Everything here runs against in-memory stand-ins: `tokio::io::duplex`
//! plays the socat relay and an ECU, the mock transport plays vcan.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p testbed-tests
//! ```
//!
//! Tests that need a real virtual CAN interface are ignored by default:
//!
//! ```bash
//! sudo modprobe vcan
//! sudo ip link add dev vcan0 type vcan
//! sudo ip link set up vcan0
//! cargo test -p testbed-tests --test vcan_test -- --ignored --test-threads=1
//! ```
//!
//! # Test Structure
//!
//! - `car_test.rs` - ECU channels through the daemon's orchestrator
//! - `attack_test.rs` - attacks, sniffer and injector on the mock bus
//! - `vcan_test.rs` - SocketCAN round trips (ignored)

// This crate only contains tests, no library code
