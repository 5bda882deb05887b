//! SocketCAN round trips on a real virtual interface
//!
//! Requires vcan0:
//!
//! ```text
//! sudo modprobe vcan
//! sudo ip link add dev vcan0 type vcan
//! sudo ip link set up vcan0
//! ```
//!
//! Run with: cargo test --test vcan_test -- --ignored

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serial_test::serial;
use testbed_attack::{Injector, ReplayRequest, SniffSession};
use testbed_can::config::BUS_INTERFACE;
use testbed_can::open_interface;
use testbed_core::CanFrame;

const RECV_TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
#[ignore = "requires vcan0"]
#[serial]
async fn test_classic_frame_round_trip() {
    let tx = open_interface(BUS_INTERFACE).await.unwrap();
    let rx = open_interface(BUS_INTERFACE).await.unwrap();

    let frame = CanFrame::new(0x43, &[0xFF, 0, 0, 0, 0, 0, 0, 0]).unwrap();
    tx.send(&frame).await.unwrap();

    let received = rx.recv(RECV_TIMEOUT).await.unwrap().expect("frame on vcan0");
    assert_eq!(received, frame);
}

#[tokio::test]
#[ignore = "requires vcan0"]
#[serial]
async fn test_fd_frame_round_trip() {
    let tx = open_interface(BUS_INTERFACE).await.unwrap();
    let rx = open_interface(BUS_INTERFACE).await.unwrap();

    let frame = CanFrame::new_fd(0x286, &[0xAB; 12]).unwrap();
    tx.send(&frame).await.unwrap();

    let received = rx.recv(RECV_TIMEOUT).await.unwrap().expect("frame on vcan0");
    assert!(received.is_fd());
    assert_eq!(received.data(), frame.data());
}

#[tokio::test]
#[ignore = "requires vcan0"]
#[serial]
async fn test_replay_is_seen_by_sniffer() {
    let sniff_side = open_interface(BUS_INTERFACE).await.unwrap();
    let inject_side = open_interface(BUS_INTERFACE).await.unwrap();

    let mut session = SniffSession::new(sniff_side).with_poll_interval(Duration::from_millis(20));
    session.set_filter(0x98, true);
    session.start().unwrap();

    let request = ReplayRequest::parse("98", "01 00 00 00", "100", "10").unwrap();
    let sent = Injector::start(Arc::clone(&inject_side), request)
        .join()
        .await
        .unwrap();
    assert_eq!(sent, 10);

    tokio::time::sleep(Duration::from_millis(200)).await;
    session.stop().await;
    let rows = session.drain(100);
    assert_eq!(rows.len(), 10);
    assert_eq!(rows.last().map(|r| r.sequence), Some(10));
}
