//! End-to-end tests for the ECU channels
//!
//! Each ECU is faked with one half of an in-memory duplex; the other half is
//! attached to a real `Orchestrator`, so frames travel through the reader,
//! sender and topic tasks exactly as they do over a pty.
//!
//! Run with: cargo test --test car_test

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use testbed_core::{EcuRole, FieldUpdate, GatewayCode, ObserverCode};
use testbed_serial::{ChannelEndpoint, Sender, TopicHub};
use testbedd::{DriverCommand, Orchestrator, Steer, CHASSIS_TOPIC};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const READ_TIMEOUT: Duration = Duration::from_millis(20);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);
const JOIN_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Fixture
// =============================================================================

/// ECU side of one channel
struct FakeEcu {
    stream: DuplexStream,
}

impl FakeEcu {
    fn attach(orch: &mut Orchestrator, role: EcuRole) -> Self {
        let (ecu, host) = tokio::io::duplex(4096);
        orch.attach(role, ChannelEndpoint::from_stream(role.name(), host))
            .unwrap();
        Self { stream: ecu }
    }

    /// One status line followed by the frame terminator
    async fn report(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).await.unwrap();
        self.stream.write_all(b"\n\n").await.unwrap();
    }

    /// Next EXD command line, without its `\r`
    async fn next_command(&mut self) -> String {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            tokio::time::timeout(Duration::from_secs(1), self.stream.read_exact(&mut byte))
                .await
                .expect("no EXD line within a second")
                .unwrap();
            if byte[0] == b'\r' {
                break;
            }
            line.push(byte[0]);
        }
        String::from_utf8(line).unwrap()
    }
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(READ_TIMEOUT, LIVENESS_TIMEOUT)
}

/// Give the reader tasks time to post what was written
async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

// =============================================================================
// ECU reports
// =============================================================================

#[tokio::test]
async fn test_every_ecu_updates_one_state() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);
    let mut powertrain = FakeEcu::attach(&mut orch, EcuRole::Powertrain);
    let mut body = FakeEcu::attach(&mut orch, EcuRole::Body);
    assert_eq!(orch.channel_count(), 3);

    chassis.report("EXU 00BB8 0732").await;
    powertrain.report("EXU 0403 05FFFFFFF6").await;
    body.report("EXU 0001 0302").await;
    settle().await;
    orch.tick(Instant::now());

    let reported = orch.snapshot().reported;
    assert_eq!(reported.engine_rpm, 0xBB8);
    assert_eq!(reported.speed_kph, 0x32);
    assert_eq!(reported.gear, 3);
    assert_eq!(reported.power_steering, -10);
    assert_eq!(reported.horn_operation, 1);
    assert_eq!(reported.front_wiper_status, 2);

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_same_code_lands_in_role_field() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);
    let mut body = FakeEcu::attach(&mut orch, EcuRole::Body);

    // Code 00 is the rpm for the chassis ECU and the horn for the body ECU
    chassis.report("EXU 0010").await;
    body.report("EXU 0000").await;
    settle().await;
    orch.tick(Instant::now());

    let reported = orch.snapshot().reported;
    assert_eq!(reported.engine_rpm, 0x10);
    assert_eq!(reported.horn_operation, 0);

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_merged_status_lines_both_apply() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);

    // A single linefeed between two lines is eaten as the sentinel
    chassis.report("EXU 0004A\nEXU 0702").await;
    settle().await;
    orch.tick(Instant::now());

    let reported = orch.snapshot().reported;
    assert_eq!(reported.engine_rpm, 0x4A);
    assert_eq!(reported.speed_kph, 2);

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_spoofed_speed_past_one_byte_is_shown() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);

    chassis.report("EXU 0712C").await;
    settle().await;
    orch.tick(Instant::now());

    assert_eq!(orch.snapshot().reported.speed_kph, 300);
    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_garbage_and_unknown_codes_leave_state_alone() {
    let mut orch = orchestrator();
    let mut body = FakeEcu::attach(&mut orch, EcuRole::Body);

    body.report("GARBAGE").await;
    body.report("EXU 0F01 zz").await;
    settle().await;
    orch.tick(Instant::now());

    assert_eq!(orch.snapshot().reported, Default::default());
    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_later_frame_wins_on_one_channel() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);

    for rpm in [0x100u32, 0x200, 0x300] {
        chassis.report(&format!("EXU 00{rpm:X}")).await;
    }
    settle().await;
    orch.tick(Instant::now());

    assert_eq!(orch.snapshot().reported.engine_rpm, 0x300);
    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_mitigation_verdicts_are_stored() {
    let mut orch = orchestrator();
    let mut observer = FakeEcu::attach(&mut orch, EcuRole::Observer);
    let mut gateway = FakeEcu::attach(&mut orch, EcuRole::Gateway);

    observer.report("EXU 0003 0101").await;
    gateway.report("EXU 00043 0101").await;
    settle().await;
    orch.tick(Instant::now());

    let reported = orch.snapshot().reported;
    assert_eq!(reported.observer_id, 3);
    assert_ne!(reported.observer_code, ObserverCode::Ok);
    assert_eq!(reported.gateway_id, 0x43);
    assert_ne!(reported.gateway_code, GatewayCode::Ok);

    orch.shutdown(JOIN_GRACE).await;
}

// =============================================================================
// Driver commands
// =============================================================================

#[tokio::test]
async fn test_driver_inputs_reach_chassis_ecu() {
    let mut orch = orchestrator();
    let mut chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);

    orch.handle_command(DriverCommand::Gas(true));
    orch.handle_command(DriverCommand::Steer(Steer::Left));
    orch.tick(Instant::now());

    let line = chassis.next_command().await;
    let tokens: Vec<&str> = line.split(' ').collect();
    assert_eq!(tokens[0], "EXD");
    assert_eq!(tokens.len(), 1 + 18);
    assert_eq!(tokens[1], "000");
    assert_eq!(tokens[2], "0114");
    assert_eq!(tokens[3], "02172");

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_only_chassis_channel_gets_commands() {
    let mut orch = orchestrator();
    let _body = FakeEcu::attach(&mut orch, EcuRole::Body);
    assert_eq!(orch.hub().subscriber_count(CHASSIS_TOPIC), 0);

    let _chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);
    assert_eq!(orch.hub().subscriber_count(CHASSIS_TOPIC), 1);

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_sender_writes_lines_in_publish_order() {
    let hub = TopicHub::new();
    let (mut ecu, host) = tokio::io::duplex(256);
    let sender = Sender::spawn(CHASSIS_TOPIC, Box::new(host), hub.subscribe(CHASSIS_TOPIC));

    hub.publish(CHASSIS_TOPIC, vec![FieldUpdate::new(0x00, 0x64)]);
    hub.publish(CHASSIS_TOPIC, vec![FieldUpdate::new(0x00, 0x00)]);

    let mut buf = [0u8; 17];
    ecu.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"EXD 0064\rEXD 000\r");

    assert_eq!(sender.join(JOIN_GRACE).await, Some(2));
}

// =============================================================================
// Liveness and shutdown
// =============================================================================

#[tokio::test]
async fn test_silent_ecu_is_marked_disconnected() {
    let mut orch = orchestrator();
    let mut body = FakeEcu::attach(&mut orch, EcuRole::Body);
    assert!(!orch.liveness().is_connected(EcuRole::Body));

    body.report("EXU 0001").await;
    settle().await;
    orch.tick(Instant::now());
    assert!(orch.liveness().is_connected(EcuRole::Body));

    orch.tick(Instant::now() + LIVENESS_TIMEOUT * 2);
    assert!(!orch.liveness().is_connected(EcuRole::Body));

    orch.shutdown(JOIN_GRACE).await;
}

#[tokio::test]
async fn test_closed_channel_does_not_block_shutdown() {
    let mut orch = orchestrator();
    let chassis = FakeEcu::attach(&mut orch, EcuRole::Chassis);
    let _body = FakeEcu::attach(&mut orch, EcuRole::Body);

    drop(chassis);
    settle().await;
    orch.tick(Instant::now());

    tokio::time::timeout(Duration::from_secs(5), orch.shutdown(JOIN_GRACE))
        .await
        .expect("shutdown should finish");
}
