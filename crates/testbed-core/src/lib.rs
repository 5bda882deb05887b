//! testbed-core - Core types for the CAN security testbed
//!
//! This crate holds the pieces shared by every other testbed crate:
//!
//! - [`CanFrame`] - classic / FD frame with its raw wire layout
//! - [`CarState`] - driver inputs plus ECU-reported signals
//! - [`EcuRole`] - the simulated ECUs and their EXU field maps
//! - [`MessageRegistry`] - arbitration id to message name lookup

pub mod car;
pub mod ecu;
pub mod error;
pub mod frame;
pub mod registry;

pub use car::{
    observed_signal_name, CarState, DriverInputs, EcuReport, GatewayCode, ObserverCode, ShiftLever,
    STEERING_CENTER,
};
pub use ecu::{EcuRole, FieldUpdate, FieldWidth, ReportedField};
pub use error::{TestbedError, TestbedResult};
pub use frame::CanFrame;
pub use registry::{Bus, MessageDef, MessageRegistry, Rate, UNKNOWN_ID};
