//! Car state model
//!
//! [`CarState`] is split into two field groups with a single writer each:
//! [`DriverInputs`] is written by the input layer and read by the EXD
//! encoder, [`EcuReport`] is written by the EXU decode path and read by the
//! presentation layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ecu::FieldUpdate;
use crate::error::TestbedError;

/// Neutral steering wheel angle (the wheel spans 0..=720)
pub const STEERING_CENTER: u16 = 360;

/// Complete vehicle state owned by the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarState {
    /// Things the driver operates
    pub driver: DriverInputs,
    /// Things only the ECUs change
    pub reported: EcuReport,
}

impl CarState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Driver-commanded signals, sent to the chassis ECU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInputs {
    /// Brake pedal, percent
    pub brake: u8,
    /// Accelerator pedal, percent
    pub accelerator: u8,
    /// Steering wheel angle, 0..=720 with 360 centred
    pub steering: u16,
    pub shift_lever: ShiftLever,
    pub turn_switch: u8,
    pub horn: bool,
    pub light_switch: u8,
    pub light_flash: u8,
    pub parking_brake: bool,
    pub wiper_front_switch: u8,
    pub wiper_rear_switch: u8,
    pub door_lock: u8,
    pub left_door_handle: u8,
    pub right_door_handle: u8,
    pub left_window_switch: u8,
    pub right_window_switch: u8,
    pub hazard: bool,
    pub engine_on: bool,
}

impl Default for DriverInputs {
    fn default() -> Self {
        Self {
            brake: 0,
            accelerator: 0,
            steering: STEERING_CENTER,
            shift_lever: ShiftLever::Park,
            turn_switch: 0,
            horn: false,
            light_switch: 0,
            light_flash: 0,
            parking_brake: false,
            wiper_front_switch: 0,
            wiper_rear_switch: 0,
            door_lock: 0,
            left_door_handle: 0,
            right_door_handle: 0,
            left_window_switch: 0,
            right_window_switch: 0,
            hazard: false,
            engine_on: false,
        }
    }
}

impl DriverInputs {
    /// Chassis command frame contents, in wire order (codes `00`..`11`)
    pub fn to_field_updates(&self) -> Vec<FieldUpdate> {
        let values: [u32; 18] = [
            self.brake as u32,
            self.accelerator as u32,
            self.steering as u32,
            self.shift_lever.as_ascii() as u32,
            self.turn_switch as u32,
            self.horn as u32,
            self.light_switch as u32,
            self.light_flash as u32,
            self.parking_brake as u32,
            self.wiper_front_switch as u32,
            self.wiper_rear_switch as u32,
            self.door_lock as u32,
            self.left_door_handle as u32,
            self.right_door_handle as u32,
            self.left_window_switch as u32,
            self.right_window_switch as u32,
            self.hazard as u32,
            self.engine_on as u32,
        ];

        values
            .iter()
            .enumerate()
            .map(|(code, &value)| FieldUpdate::new(code as u8, value))
            .collect()
    }
}

/// Signals reported back by the ECUs over EXU frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuReport {
    pub engine_rpm: u16,
    pub speed_kph: u16,
    pub gear: u8,
    pub shift_position: u8,
    pub engine_status: u8,
    pub brake_output: u16,
    pub parking_brake_status: u8,
    /// Front wheel angle; the ECU prints C `int`s with `%x`, so negative
    /// angles arrive as 32-bit two's complement
    pub power_steering: i32,
    pub turn_signal_indicator: u8,
    pub door_open_indicator: u8,
    pub door_lock_indicator: u8,
    pub horn_operation: u8,
    pub light_status: u8,
    pub front_wiper_status: u8,
    pub rear_wiper_status: u8,
    pub door_lock_status: u8,
    pub left_door_position: u8,
    pub right_door_position: u8,
    pub left_window_position: u8,
    pub right_window_position: u8,
    /// Which signal the observer flagged (see [`observed_signal_name`])
    pub observer_id: u8,
    pub observer_code: ObserverCode,
    /// CAN id last handled by the gateway
    pub gateway_id: u32,
    pub gateway_code: GatewayCode,
}

/// Gear lever position, transmitted as its ASCII letter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftLever {
    #[default]
    Park,
    Reverse,
    Neutral,
    Drive,
}

impl ShiftLever {
    pub fn as_ascii(self) -> u8 {
        match self {
            ShiftLever::Park => b'P',
            ShiftLever::Reverse => b'R',
            ShiftLever::Neutral => b'N',
            ShiftLever::Drive => b'D',
        }
    }

    /// Move one notch towards Drive (P → R → N → D)
    pub fn shift_down(self) -> Self {
        match self {
            ShiftLever::Park => ShiftLever::Reverse,
            ShiftLever::Reverse => ShiftLever::Neutral,
            ShiftLever::Neutral | ShiftLever::Drive => ShiftLever::Drive,
        }
    }

    /// Move one notch towards Park (D → N → R → P)
    pub fn shift_up(self) -> Self {
        match self {
            ShiftLever::Drive => ShiftLever::Neutral,
            ShiftLever::Neutral => ShiftLever::Reverse,
            ShiftLever::Reverse | ShiftLever::Park => ShiftLever::Park,
        }
    }
}

impl FromStr for ShiftLever {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P" => Ok(ShiftLever::Park),
            "R" => Ok(ShiftLever::Reverse),
            "N" => Ok(ShiftLever::Neutral),
            "D" => Ok(ShiftLever::Drive),
            other => Err(TestbedError::InvalidShiftLever(other.to_string())),
        }
    }
}

impl fmt::Display for ShiftLever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ascii() as char)
    }
}

/// Verdict reported by the observer (intrusion detection) ECU
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObserverCode {
    #[default]
    Ok,
    BadValue,
    BadTiming,
    BadCanId,
}

impl TryFrom<u32> for ObserverCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ObserverCode::Ok),
            1 => Ok(ObserverCode::BadValue),
            2 => Ok(ObserverCode::BadTiming),
            3 => Ok(ObserverCode::BadCanId),
            other => Err(other),
        }
    }
}

impl fmt::Display for ObserverCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObserverCode::Ok => "OK",
            ObserverCode::BadValue => "BAD_VALUE",
            ObserverCode::BadTiming => "BAD_TIMING",
            ObserverCode::BadCanId => "BAD_CAN_ID",
        };
        f.write_str(s)
    }
}

/// Verdict reported by the gateway ECU for the last routed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayCode {
    #[default]
    Ok,
    ReadBlocked,
    WriteBlocked,
}

impl TryFrom<u32> for GatewayCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GatewayCode::Ok),
            1 => Ok(GatewayCode::ReadBlocked),
            2 => Ok(GatewayCode::WriteBlocked),
            other => Err(other),
        }
    }
}

impl fmt::Display for GatewayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayCode::Ok => "OK",
            GatewayCode::ReadBlocked => "READ_BLOCKED",
            GatewayCode::WriteBlocked => "WRITE_BLOCKED",
        };
        f.write_str(s)
    }
}

/// Signals the observer ECU can flag, indexed by observer id
const OBSERVED_SIGNALS: [&str; 39] = [
    "NONE",
    "ENGINE_RPM",
    "SPEED_KPH",
    "BRAKE_VALUE",
    "ACCELERATOR_VALUE",
    "STEERING_VALUE",
    "SHIFT_VALUE",
    "ENGINE_VALUE",
    "TURN_SWITCH_VALUE",
    "HAZARD_VALUE",
    "HORN_VALUE",
    "LIGHT_SWITCH_VALUE",
    "LIGHT_FLASH_VALUE",
    "PARKING_VALUE",
    "WIPER_F_SW_VALUE",
    "WIPER_R_SW_VALUE",
    "DOOR_LOCK_VALUE",
    "L_WINDOW_SWITCH_VALUE",
    "R_WINDOW_SWITCH_VALUE",
    "BRAKE_OUTPUT",
    "POWER_STEERING",
    "GEAR",
    "SHIFT_POSITION",
    "TURN_SIGNAL_INDICATOR",
    "DOOR_OPEN_INDICATOR",
    "DOOR_LOCK_INDICATOR",
    "HORN_OPERATION",
    "ENGINE_STATUS",
    "PARKING_BRAKE_STATUS",
    "LIGHT_STATUS",
    "FRONT_WIPER_STATUS",
    "REAR_WIPER_STATUS",
    "DOOR_LOCK_STATUS",
    "L_DOOR_HANDLE_VALUE",
    "R_DOOR_HANDLE_VALUE",
    "L_DOOR_POSITION",
    "R_DOOR_POSITION",
    "L_WINDOW_POSITION",
    "R_WINDOW_POSITION",
];

/// Name of the signal an observer id refers to
pub fn observed_signal_name(observer_id: u8) -> Option<&'static str> {
    OBSERVED_SIGNALS.get(observer_id as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_steering_is_centred() {
        let state = CarState::new();
        assert_eq!(state.driver.steering, STEERING_CENTER);
        assert_eq!(state.driver.shift_lever, ShiftLever::Park);
    }

    #[test]
    fn chassis_updates_follow_wire_order() {
        let mut inputs = DriverInputs::default();
        inputs.brake = 0x64;
        inputs.shift_lever = ShiftLever::Drive;
        inputs.engine_on = true;

        let updates = inputs.to_field_updates();
        assert_eq!(updates.len(), 18);
        assert_eq!(updates[0], FieldUpdate::new(0x00, 0x64));
        assert_eq!(updates[2], FieldUpdate::new(0x02, 360));
        assert_eq!(updates[3], FieldUpdate::new(0x03, b'D' as u32));
        assert_eq!(updates[17], FieldUpdate::new(0x11, 1));
    }

    #[test]
    fn shift_lever_walks_the_gate() {
        let mut lever = ShiftLever::Park;
        for _ in 0..5 {
            lever = lever.shift_down();
        }
        assert_eq!(lever, ShiftLever::Drive);
        assert_eq!(lever.shift_up(), ShiftLever::Neutral);
        assert_eq!("r".parse::<ShiftLever>().unwrap(), ShiftLever::Reverse);
        assert!("X".parse::<ShiftLever>().is_err());
    }

    #[test]
    fn codes_reject_out_of_range_values() {
        assert_eq!(ObserverCode::try_from(3), Ok(ObserverCode::BadCanId));
        assert_eq!(ObserverCode::try_from(4), Err(4));
        assert_eq!(GatewayCode::try_from(2), Ok(GatewayCode::WriteBlocked));
        assert_eq!(GatewayCode::try_from(3), Err(3));
    }

    #[test]
    fn observer_ids_name_signals() {
        assert_eq!(observed_signal_name(1), Some("ENGINE_RPM"));
        assert_eq!(observed_signal_name(38), Some("R_WINDOW_POSITION"));
        assert_eq!(observed_signal_name(39), None);
    }
}
