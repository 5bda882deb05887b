//! Arbitration id → message name registry
//!
//! Used by the sniffer and the frame logger to label traffic. Nothing in the
//! control path consults it.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

/// Name returned for ids that are not in the table
pub const UNKNOWN_ID: &str = "UNKNOWN ID";

/// Logical bus a message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    Powertrain,
    Chassis,
    Body,
    Diagnostic,
}

/// Nominal transmit rate (informational only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Rate {
    Hz100,
    Hz20,
    Hz10,
    Hz2,
    /// Sent only in response to a tester request
    OnRequest,
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bus::Powertrain => "powertrain",
            Bus::Chassis => "chassis",
            Bus::Body => "body",
            Bus::Diagnostic => "diagnostic",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rate::Hz100 => "100Hz",
            Rate::Hz20 => "20Hz",
            Rate::Hz10 => "10Hz",
            Rate::Hz2 => "2Hz",
            Rate::OnRequest => "on request",
        };
        f.write_str(s)
    }
}

/// One entry of the message table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageDef {
    pub name: &'static str,
    pub id: u32,
    pub bus: Bus,
    pub rate: Rate,
}

const fn msg(name: &'static str, id: u32, bus: Bus, rate: Rate) -> MessageDef {
    MessageDef {
        name,
        id,
        bus,
        rate,
    }
}

const MESSAGES: &[MessageDef] = &[
    // Powertrain
    msg("BRAKE_OUTPUT_IND_MSG", 0x24, Bus::Powertrain, Rate::Hz100),
    msg("ENGINE_RPM_MSG", 0x43, Bus::Powertrain, Rate::Hz100),
    msg("POWER_STEERING_OUT_IND_MSG", 0x62, Bus::Powertrain, Rate::Hz100),
    msg("SHIFT_POSITION_MSG", 0x77, Bus::Powertrain, Rate::Hz100),
    msg("ENGINE_STATUS_MSG", 0x19A, Bus::Powertrain, Rate::Hz20),
    msg("PARKING_BRAKE_STATUS_MSG", 0x1D3, Bus::Powertrain, Rate::Hz20),
    // Chassis
    msg("BRAKE_OPERATION_MSG", 0x1A, Bus::Chassis, Rate::Hz100),
    msg("ACCELERATION_OPERATION_MSG", 0x2F, Bus::Chassis, Rate::Hz100),
    msg("STEERING_WHEEL_POS_MSG", 0x58, Bus::Chassis, Rate::Hz100),
    msg("SHIFT_POSITION_SWITCH_MSG", 0x6D, Bus::Chassis, Rate::Hz100),
    msg("ENGINE_START_MSG", 0x1B8, Bus::Chassis, Rate::Hz100),
    msg("TURN_SWITCH_MSG", 0x83, Bus::Chassis, Rate::Hz100),
    msg("HORN_SWITCH_MSG", 0x98, Bus::Chassis, Rate::Hz100),
    msg("LIGHT_SWITCH_MSG", 0x1A7, Bus::Chassis, Rate::Hz20),
    msg("LIGHT_FLASH_MSG", 0x1B1, Bus::Chassis, Rate::Hz20),
    msg("PARKING_BRAKE_MSG", 0x1C9, Bus::Chassis, Rate::Hz20),
    msg("WIPER_SWITCH_FRONT_MSG", 0x25C, Bus::Chassis, Rate::Hz10),
    msg("WIPER_SWITCH_REAR_MSG", 0x271, Bus::Chassis, Rate::Hz10),
    msg("DOOR_LOCK_UNLOCK_MSG", 0x286, Bus::Chassis, Rate::Hz10),
    msg("L_WINDOW_SWITCH_MSG", 0x29C, Bus::Chassis, Rate::Hz10),
    msg("R_WINDOW_SWITCH_MSG", 0x2B1, Bus::Chassis, Rate::Hz10),
    msg("L_DOOR_HANDLE_MSG", 0x29D, Bus::Chassis, Rate::Hz10),
    msg("R_DOOR_HANDLE_MSG", 0x2B2, Bus::Chassis, Rate::Hz10),
    // Body
    msg("TURN_SIGNAL_INDICATOR_MSG", 0x8D, Bus::Body, Rate::Hz100),
    msg("HORN_OPERATION_MSG", 0xA2, Bus::Body, Rate::Hz100),
    msg("LIGHT_INDICATOR_MSG", 0x1BB, Bus::Body, Rate::Hz20),
    msg("FRONT_WIPER_STATUS_MSG", 0x266, Bus::Body, Rate::Hz10),
    msg("REAR_WIPER_STATUS_MSG", 0x27B, Bus::Body, Rate::Hz10),
    msg("DOOR_LOCK_STATUS_MSG", 0x290, Bus::Body, Rate::Hz10),
    msg("L_WINDOW_POSITION_MSG", 0x2BB, Bus::Body, Rate::Hz10),
    msg("R_WINDOW_POSITION_MSG", 0x2A6, Bus::Body, Rate::Hz10),
    msg("L_DOOR_POSITION_MSG", 0x2BC, Bus::Body, Rate::Hz2),
    msg("R_DOOR_POSITION_MSG", 0x2A7, Bus::Body, Rate::Hz2),
    // OBD-II diagnostics
    msg("OBD2_FUNCTIONAL_REQUEST_MSG", 0x7DF, Bus::Diagnostic, Rate::OnRequest),
    msg("OBD2_ENGINE_REQUEST_MSG", 0x7E0, Bus::Diagnostic, Rate::OnRequest),
    msg("OBD2_ENGINE_RESPONSE_MSG", 0x7E8, Bus::Diagnostic, Rate::OnRequest),
];

/// Read-only id → name lookup
#[derive(Debug)]
pub struct MessageRegistry {
    by_id: HashMap<u32, &'static MessageDef>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        let by_id = MESSAGES.iter().map(|def| (def.id, def)).collect();
        Self { by_id }
    }

    /// Process-wide registry, built on first use
    pub fn global() -> &'static MessageRegistry {
        static REGISTRY: OnceLock<MessageRegistry> = OnceLock::new();
        REGISTRY.get_or_init(MessageRegistry::new)
    }

    /// Registered name for `id`, or [`UNKNOWN_ID`]
    pub fn lookup(&self, id: u32) -> &'static str {
        self.by_id.get(&id).map(|def| def.name).unwrap_or(UNKNOWN_ID)
    }

    pub fn get(&self, id: u32) -> Option<&'static MessageDef> {
        self.by_id.get(&id).copied()
    }

    /// All entries in table order
    pub fn iter(&self) -> impl Iterator<Item = &'static MessageDef> {
        MESSAGES.iter()
    }

    pub fn on_bus(&self, bus: Bus) -> impl Iterator<Item = &'static MessageDef> {
        MESSAGES.iter().filter(move |def| def.bus == bus)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
