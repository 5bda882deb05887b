//! ECU roles and their EXU field maps
//!
//! Every ECU reports its status with the same `<code><hex value>` tokens, but
//! each role assigns its own meaning to the field codes. The tables below are
//! the single source of truth for that mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::car::{EcuReport, GatewayCode, ObserverCode};
use crate::error::{TestbedError, TestbedResult};

/// One `(field_index, value)` pair of an EXD/EXU frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// Two hex digit field code
    pub field_index: u8,
    pub value: u32,
}

impl FieldUpdate {
    pub fn new(field_index: u8, value: u32) -> Self {
        Self { field_index, value }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:X}", self.field_index, self.value)
    }
}

/// The simulated control units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcuRole {
    Body,
    Chassis,
    Powertrain,
    /// Optional intrusion detection mitigation
    Observer,
    /// Optional gateway mitigation
    Gateway,
}

impl EcuRole {
    /// All roles, in relay start-up order
    pub const ALL: [EcuRole; 5] = [
        EcuRole::Body,
        EcuRole::Chassis,
        EcuRole::Powertrain,
        EcuRole::Observer,
        EcuRole::Gateway,
    ];

    /// Name used for channels, topics and the ECU binary's first argument
    pub fn name(self) -> &'static str {
        match self {
            EcuRole::Body => "body",
            EcuRole::Chassis => "chassis",
            EcuRole::Powertrain => "powertrain",
            EcuRole::Observer => "observer",
            EcuRole::Gateway => "gateway",
        }
    }

    /// Observer and gateway only run when their mitigation is selected
    pub fn is_mitigation(self) -> bool {
        matches!(self, EcuRole::Observer | EcuRole::Gateway)
    }

    /// EXU field code → reported signal table for this role
    pub fn field_map(self) -> &'static [(u8, ReportedField)] {
        use ReportedField as F;
        match self {
            EcuRole::Powertrain => &[
                (0x00, F::ShiftPosition),
                (0x01, F::EngineStatus),
                (0x02, F::BrakeOutput),
                (0x03, F::ParkingBrakeStatus),
                (0x04, F::Gear),
                (0x05, F::PowerSteering),
            ],
            EcuRole::Chassis => &[
                (0x00, F::EngineRpm),
                (0x01, F::ShiftPosition),
                (0x02, F::EngineStatus),
                (0x03, F::ParkingBrakeStatus),
                (0x04, F::TurnSignalIndicator),
                (0x05, F::DoorOpenIndicator),
                (0x06, F::DoorLockIndicator),
                (0x07, F::SpeedKph),
            ],
            EcuRole::Body => &[
                (0x00, F::HornOperation),
                (0x01, F::LightStatus),
                (0x02, F::TurnSignalIndicator),
                (0x03, F::FrontWiperStatus),
                (0x04, F::RearWiperStatus),
                (0x05, F::DoorLockStatus),
                (0x06, F::LeftDoorPosition),
                (0x07, F::RightDoorPosition),
                (0x08, F::LeftWindowPosition),
                (0x09, F::RightWindowPosition),
            ],
            EcuRole::Observer => &[(0x00, F::ObserverId), (0x01, F::ObserverCode)],
            EcuRole::Gateway => &[(0x00, F::GatewayId), (0x01, F::GatewayCode)],
        }
    }

    /// Resolve a field code for this role
    pub fn field(self, code: u8) -> Option<ReportedField> {
        self.field_map()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, field)| *field)
    }

    /// Apply decoded updates to the report, skipping codes this role does
    /// not define and values that do not fit their field.
    ///
    /// Returns the number of updates applied.
    pub fn apply(self, report: &mut EcuReport, updates: &[FieldUpdate]) -> usize {
        let mut applied = 0;
        for update in updates {
            let Some(field) = self.field(update.field_index) else {
                tracing::debug!(
                    role = self.name(),
                    code = update.field_index,
                    "Ignoring unknown field code"
                );
                continue;
            };
            match report.set(field, update.value) {
                Ok(()) => applied += 1,
                Err(e) => tracing::debug!(role = self.name(), error = %e, "Dropping field update"),
            }
        }
        applied
    }
}

impl fmt::Display for EcuRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EcuRole {
    type Err = TestbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EcuRole::ALL
            .into_iter()
            .find(|role| role.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TestbedError::UnknownRole(s.to_string()))
    }
}

/// Value range accepted for a reported field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16,
    U32,
    /// 32-bit two's complement carried as its unsigned bit pattern
    I32,
    /// Closed enumeration with codes `0..=max`
    Code(u32),
}

impl FieldWidth {
    pub fn fits(self, value: u32) -> bool {
        match self {
            FieldWidth::U8 => value <= u8::MAX as u32,
            FieldWidth::U16 => value <= u16::MAX as u32,
            FieldWidth::U32 | FieldWidth::I32 => true,
            FieldWidth::Code(max) => value <= max,
        }
    }
}

/// ECU-reported signals addressable by EXU field codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportedField {
    EngineRpm,
    SpeedKph,
    Gear,
    ShiftPosition,
    EngineStatus,
    BrakeOutput,
    ParkingBrakeStatus,
    PowerSteering,
    TurnSignalIndicator,
    DoorOpenIndicator,
    DoorLockIndicator,
    HornOperation,
    LightStatus,
    FrontWiperStatus,
    RearWiperStatus,
    DoorLockStatus,
    LeftDoorPosition,
    RightDoorPosition,
    LeftWindowPosition,
    RightWindowPosition,
    ObserverId,
    ObserverCode,
    GatewayId,
    GatewayCode,
}

impl ReportedField {
    pub fn name(self) -> &'static str {
        use ReportedField as F;
        match self {
            F::EngineRpm => "engine_rpm",
            F::SpeedKph => "speed_kph",
            F::Gear => "gear",
            F::ShiftPosition => "shift_position",
            F::EngineStatus => "engine_status",
            F::BrakeOutput => "brake_output",
            F::ParkingBrakeStatus => "parking_brake_status",
            F::PowerSteering => "power_steering",
            F::TurnSignalIndicator => "turn_signal_indicator",
            F::DoorOpenIndicator => "door_open_indicator",
            F::DoorLockIndicator => "door_lock_indicator",
            F::HornOperation => "horn_operation",
            F::LightStatus => "light_status",
            F::FrontWiperStatus => "front_wiper_status",
            F::RearWiperStatus => "rear_wiper_status",
            F::DoorLockStatus => "door_lock_status",
            F::LeftDoorPosition => "left_door_position",
            F::RightDoorPosition => "right_door_position",
            F::LeftWindowPosition => "left_window_position",
            F::RightWindowPosition => "right_window_position",
            F::ObserverId => "observer_id",
            F::ObserverCode => "observer_code",
            F::GatewayId => "gateway_id",
            F::GatewayCode => "gateway_code",
        }
    }

    pub fn width(self) -> FieldWidth {
        use ReportedField as F;
        match self {
            F::EngineRpm | F::SpeedKph | F::BrakeOutput => FieldWidth::U16,
            F::PowerSteering => FieldWidth::I32,
            F::GatewayId => FieldWidth::U32,
            F::ObserverCode => FieldWidth::Code(3),
            F::GatewayCode => FieldWidth::Code(2),
            _ => FieldWidth::U8,
        }
    }
}

impl EcuReport {
    /// Write one reported signal after checking its width
    pub fn set(&mut self, field: ReportedField, value: u32) -> TestbedResult<()> {
        if !field.width().fits(value) {
            return Err(TestbedError::ValueOutOfRange {
                field: field.name(),
                value,
            });
        }

        use ReportedField as F;
        match field {
            F::EngineRpm => self.engine_rpm = value as u16,
            F::SpeedKph => self.speed_kph = value as u16,
            F::Gear => self.gear = value as u8,
            F::ShiftPosition => self.shift_position = value as u8,
            F::EngineStatus => self.engine_status = value as u8,
            F::BrakeOutput => self.brake_output = value as u16,
            F::ParkingBrakeStatus => self.parking_brake_status = value as u8,
            F::PowerSteering => self.power_steering = value as i32,
            F::TurnSignalIndicator => self.turn_signal_indicator = value as u8,
            F::DoorOpenIndicator => self.door_open_indicator = value as u8,
            F::DoorLockIndicator => self.door_lock_indicator = value as u8,
            F::HornOperation => self.horn_operation = value as u8,
            F::LightStatus => self.light_status = value as u8,
            F::FrontWiperStatus => self.front_wiper_status = value as u8,
            F::RearWiperStatus => self.rear_wiper_status = value as u8,
            F::DoorLockStatus => self.door_lock_status = value as u8,
            F::LeftDoorPosition => self.left_door_position = value as u8,
            F::RightDoorPosition => self.right_door_position = value as u8,
            F::LeftWindowPosition => self.left_window_position = value as u8,
            F::RightWindowPosition => self.right_window_position = value as u8,
            F::ObserverId => self.observer_id = value as u8,
            F::GatewayId => self.gateway_id = value,
            F::ObserverCode => {
                self.observer_code = ObserverCode::try_from(value).map_err(|v| {
                    TestbedError::ValueOutOfRange {
                        field: field.name(),
                        value: v,
                    }
                })?
            }
            F::GatewayCode => {
                self.gateway_code = GatewayCode::try_from(value).map_err(|v| {
                    TestbedError::ValueOutOfRange {
                        field: field.name(),
                        value: v,
                    }
                })?
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_code_means_different_fields_per_role() {
        assert_eq!(EcuRole::Chassis.field(0x00), Some(ReportedField::EngineRpm));
        assert_eq!(
            EcuRole::Powertrain.field(0x00),
            Some(ReportedField::ShiftPosition)
        );
        assert_eq!(
            EcuRole::Body.field(0x00),
            Some(ReportedField::HornOperation)
        );
        assert_eq!(EcuRole::Observer.field(0x02), None);
    }

    #[test]
    fn apply_skips_unknown_codes_and_wide_values() {
        let mut report = EcuReport::default();
        let applied = EcuRole::Chassis.apply(
            &mut report,
            &[
                FieldUpdate::new(0x00, 0x4A),
                FieldUpdate::new(0x07, 0x1_0000),
                FieldUpdate::new(0x42, 1),
            ],
        );
        assert_eq!(applied, 1);
        assert_eq!(report.engine_rpm, 0x4A);
        assert_eq!(report.speed_kph, 0);
    }

    #[test]
    fn speed_above_one_byte_is_stored() {
        // The observer flags anything past 255 km/h as a bad value
        let mut report = EcuReport::default();
        let applied = EcuRole::Chassis.apply(&mut report, &[FieldUpdate::new(0x07, 0x12C)]);
        assert_eq!(applied, 1);
        assert_eq!(report.speed_kph, 300);
    }

    #[test]
    fn negative_steering_angle_survives_hex_transport() {
        let mut report = EcuReport::default();
        EcuRole::Powertrain.apply(&mut report, &[FieldUpdate::new(0x05, 0xFFFF_FFF6)]);
        assert_eq!(report.power_steering, -10);
    }

    #[test]
    fn observer_code_outside_enum_is_dropped() {
        let mut report = EcuReport::default();
        EcuRole::Observer.apply(
            &mut report,
            &[FieldUpdate::new(0x00, 1), FieldUpdate::new(0x01, 7)],
        );
        assert_eq!(report.observer_id, 1);
        assert_eq!(report.observer_code, crate::ObserverCode::Ok);

        EcuRole::Observer.apply(&mut report, &[FieldUpdate::new(0x01, 2)]);
        assert_eq!(report.observer_code, crate::ObserverCode::BadTiming);
    }

    #[test]
    fn role_names_round_trip() {
        for role in EcuRole::ALL {
            assert_eq!(role.name().parse::<EcuRole>().unwrap(), role);
        }
        assert!("radio".parse::<EcuRole>().is_err());
    }

    #[test]
    fn field_update_display_is_unpadded_hex() {
        assert_eq!(FieldUpdate::new(0x00, 0x64).to_string(), "0064");
        assert_eq!(FieldUpdate::new(0x0A, 0x0).to_string(), "0A0");
    }
}
