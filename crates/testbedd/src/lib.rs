//! testbedd - CAN testbed daemon
//!
//! Starts the relays and ECU processes for the simulated car, attaches a
//! reader to every ECU channel and a sender to the chassis channel, and runs
//! the tick loop that keeps [`testbed_core::CarState`] in sync with the ECUs.

pub mod config;
pub mod controls;
pub mod liveness;
pub mod orchestrator;
pub mod startup;
pub mod supervisor;

pub use config::{ChannelPaths, LoggerConfig, Mitigations, TestbedConfig};
pub use controls::{Controls, DriverCommand, Side, Steer};
pub use liveness::{Link, Liveness};
pub use orchestrator::{Orchestrator, CHASSIS_TOPIC};
pub use startup::{StageContext, StartupError, StartupStage};
pub use supervisor::{EncryptionKey, RelayPair, Supervisor, SupervisorError};
