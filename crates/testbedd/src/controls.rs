//! Driver input simulation
//!
//! Pedals and the steering wheel behave like held keys: while "pressed" they
//! move a step per tick, when released they drift back. Everything else is a
//! switch that takes effect immediately.
//!
//! Commands arrive as text lines (one per stdin line):
//!
//! ```text
//! gas on|off        brake on|off       steer left|right|off
//! shift up|down|P|R|N|D                wiper up|down
//! turn left|right|off                  lights <0-3>      flash on|off
//! horn on|off       hazard on|off      park on|off       engine on|off
//! lock on|off       door left|right on|off               window left|right <0-2>
//! ```

use std::fmt;
use std::str::FromStr;

use testbed_core::{DriverInputs, ShiftLever, STEERING_CENTER};

/// Pedal change per tick, percent
pub const PEDAL_STEP: u8 = 20;
/// Steering change per tick
pub const STEERING_STEP: u16 = 10;
/// Full steering lock (the wheel spans 0..=720)
pub const STEERING_MAX: u16 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Steer {
    #[default]
    Released,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// One parsed driver command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    Gas(bool),
    Brake(bool),
    Steer(Steer),
    ShiftUp,
    ShiftDown,
    Shift(ShiftLever),
    WiperUp,
    WiperDown,
    Turn(u8),
    Lights(u8),
    Flash(bool),
    Horn(bool),
    Hazard(bool),
    ParkingBrake(bool),
    Engine(bool),
    Lock(bool),
    DoorHandle(Side, bool),
    Window(Side, u8),
}

/// Rejected command line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognised driver command: {0}")]
pub struct UnknownCommand(pub String);

/// Wiper stalk: 0 = down (rear wiper), 1 = neutral, 2 = up (front wiper)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WiperStalk(u8);

impl Default for WiperStalk {
    fn default() -> Self {
        Self(1)
    }
}

impl WiperStalk {
    pub fn up(&mut self) {
        self.0 = (self.0 + 1).min(2);
    }

    pub fn down(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn state(self) -> u8 {
        self.0
    }

    pub fn front(self) -> u8 {
        (self.0 == 2) as u8
    }

    pub fn rear(self) -> u8 {
        (self.0 == 0) as u8
    }
}

/// Held controls between ticks
#[derive(Debug, Clone, Default)]
pub struct Controls {
    gas: bool,
    brake: bool,
    steer: Steer,
    wiper: WiperStalk,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command; switches are written straight into `driver`
    pub fn handle(&mut self, command: DriverCommand, driver: &mut DriverInputs) {
        match command {
            DriverCommand::Gas(on) => self.gas = on,
            DriverCommand::Brake(on) => self.brake = on,
            DriverCommand::Steer(steer) => self.steer = steer,
            DriverCommand::ShiftUp => driver.shift_lever = driver.shift_lever.shift_up(),
            DriverCommand::ShiftDown => driver.shift_lever = driver.shift_lever.shift_down(),
            DriverCommand::Shift(lever) => driver.shift_lever = lever,
            DriverCommand::WiperUp => self.wiper.up(),
            DriverCommand::WiperDown => self.wiper.down(),
            DriverCommand::Turn(state) => driver.turn_switch = state,
            DriverCommand::Lights(state) => driver.light_switch = state,
            DriverCommand::Flash(on) => driver.light_flash = on as u8,
            DriverCommand::Horn(on) => driver.horn = on,
            DriverCommand::Hazard(on) => driver.hazard = on,
            DriverCommand::ParkingBrake(on) => driver.parking_brake = on,
            DriverCommand::Engine(on) => driver.engine_on = on,
            DriverCommand::Lock(on) => driver.door_lock = on as u8,
            DriverCommand::DoorHandle(Side::Left, on) => driver.left_door_handle = on as u8,
            DriverCommand::DoorHandle(Side::Right, on) => driver.right_door_handle = on as u8,
            DriverCommand::Window(Side::Left, state) => driver.left_window_switch = state,
            DriverCommand::Window(Side::Right, state) => driver.right_window_switch = state,
        }
    }

    /// Advance held controls by one tick
    pub fn tick(&self, driver: &mut DriverInputs) {
        driver.brake = ramp(driver.brake, self.brake);
        driver.accelerator = ramp(driver.accelerator, self.gas);

        driver.steering = match self.steer {
            Steer::Left => (driver.steering + STEERING_STEP).min(STEERING_MAX),
            Steer::Right => driver.steering.saturating_sub(STEERING_STEP),
            Steer::Released if driver.steering > STEERING_CENTER => {
                (driver.steering - STEERING_STEP).max(STEERING_CENTER)
            }
            Steer::Released => (driver.steering + STEERING_STEP).min(STEERING_CENTER),
        };

        driver.wiper_front_switch = self.wiper.front();
        driver.wiper_rear_switch = self.wiper.rear();
    }
}

fn ramp(value: u8, pressed: bool) -> u8 {
    if pressed {
        value.saturating_add(PEDAL_STEP).min(100)
    } else {
        value.saturating_sub(PEDAL_STEP)
    }
}

fn on_off(word: Option<&str>) -> Option<bool> {
    match word? {
        "on" | "1" | "pressed" => Some(true),
        "off" | "0" | "released" => Some(false),
        _ => None,
    }
}

fn side(word: Option<&str>) -> Option<Side> {
    match word? {
        "left" | "l" => Some(Side::Left),
        "right" | "r" => Some(Side::Right),
        _ => None,
    }
}

fn small(word: Option<&str>, max: u8) -> Option<u8> {
    word?.parse().ok().filter(|v| *v <= max)
}

impl FromStr for DriverCommand {
    type Err = UnknownCommand;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let lower = line.trim().to_ascii_lowercase();
        let mut words = lower.split_whitespace();
        let verb = words.next();
        let arg = words.next();
        let third = words.next();

        let command = match verb {
            Some("gas") | Some("accel") => on_off(arg).map(DriverCommand::Gas),
            Some("brake") => on_off(arg).map(DriverCommand::Brake),
            Some("steer") => match arg {
                Some("left") => Some(DriverCommand::Steer(Steer::Left)),
                Some("right") => Some(DriverCommand::Steer(Steer::Right)),
                Some("off") | Some("center") => Some(DriverCommand::Steer(Steer::Released)),
                _ => None,
            },
            Some("shift") => match arg {
                Some("up") => Some(DriverCommand::ShiftUp),
                Some("down") => Some(DriverCommand::ShiftDown),
                Some(gear) => gear.parse().ok().map(DriverCommand::Shift),
                None => None,
            },
            Some("wiper") => match arg {
                Some("up") => Some(DriverCommand::WiperUp),
                Some("down") => Some(DriverCommand::WiperDown),
                _ => None,
            },
            Some("turn") => match arg {
                Some("off") => Some(DriverCommand::Turn(0)),
                Some("left") => Some(DriverCommand::Turn(1)),
                Some("right") => Some(DriverCommand::Turn(2)),
                _ => None,
            },
            Some("lights") => small(arg, 3).map(DriverCommand::Lights),
            Some("flash") => on_off(arg).map(DriverCommand::Flash),
            Some("horn") => on_off(arg).map(DriverCommand::Horn),
            Some("hazard") => on_off(arg).map(DriverCommand::Hazard),
            Some("park") => on_off(arg).map(DriverCommand::ParkingBrake),
            Some("engine") => on_off(arg).map(DriverCommand::Engine),
            Some("lock") => on_off(arg).map(DriverCommand::Lock),
            Some("door") => side(arg).zip(on_off(third)).map(|(s, on)| DriverCommand::DoorHandle(s, on)),
            Some("window") => side(arg).zip(small(third, 2)).map(|(s, v)| DriverCommand::Window(s, v)),
            _ => None,
        };

        command.ok_or_else(|| UnknownCommand(line.trim().to_string()))
    }
}

impl fmt::Display for Steer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Steer::Released => "released",
            Steer::Left => "left",
            Steer::Right => "right",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pedal_ramps_and_clamps() {
        let mut controls = Controls::new();
        let mut driver = DriverInputs::default();

        controls.handle(DriverCommand::Gas(true), &mut driver);
        let mut seen = Vec::new();
        for _ in 0..7 {
            controls.tick(&mut driver);
            seen.push(driver.accelerator);
        }
        assert_eq!(seen, vec![20, 40, 60, 80, 100, 100, 100]);

        controls.handle(DriverCommand::Gas(false), &mut driver);
        for _ in 0..6 {
            controls.tick(&mut driver);
        }
        assert_eq!(driver.accelerator, 0);
        assert_eq!(driver.brake, 0);
    }

    #[test]
    fn steering_turns_and_self_centres() {
        let mut controls = Controls::new();
        let mut driver = DriverInputs::default();

        controls.handle(DriverCommand::Steer(Steer::Left), &mut driver);
        for _ in 0..100 {
            controls.tick(&mut driver);
        }
        assert_eq!(driver.steering, STEERING_MAX);

        controls.handle(DriverCommand::Steer(Steer::Released), &mut driver);
        controls.tick(&mut driver);
        assert_eq!(driver.steering, STEERING_MAX - 10);
        for _ in 0..100 {
            controls.tick(&mut driver);
        }
        assert_eq!(driver.steering, STEERING_CENTER);

        controls.handle(DriverCommand::Steer(Steer::Right), &mut driver);
        for _ in 0..100 {
            controls.tick(&mut driver);
        }
        assert_eq!(driver.steering, 0);
    }

    #[test]
    fn wiper_stalk_maps_to_front_and_rear() {
        let mut controls = Controls::new();
        let mut driver = DriverInputs::default();

        controls.tick(&mut driver);
        assert_eq!((driver.wiper_front_switch, driver.wiper_rear_switch), (0, 0));

        controls.handle(DriverCommand::WiperUp, &mut driver);
        controls.handle(DriverCommand::WiperUp, &mut driver);
        controls.tick(&mut driver);
        assert_eq!((driver.wiper_front_switch, driver.wiper_rear_switch), (1, 0));

        for _ in 0..3 {
            controls.handle(DriverCommand::WiperDown, &mut driver);
        }
        controls.tick(&mut driver);
        assert_eq!((driver.wiper_front_switch, driver.wiper_rear_switch), (0, 1));
    }

    #[test]
    fn parses_commands() {
        assert_eq!("gas on".parse(), Ok(DriverCommand::Gas(true)));
        assert_eq!("Shift D".parse(), Ok(DriverCommand::Shift(ShiftLever::Drive)));
        assert_eq!("shift down".parse(), Ok(DriverCommand::ShiftDown));
        assert_eq!(
            "door left on".parse(),
            Ok(DriverCommand::DoorHandle(Side::Left, true))
        );
        assert_eq!("window right 2".parse(), Ok(DriverCommand::Window(Side::Right, 2)));
        assert!("window right 3".parse::<DriverCommand>().is_err());
        assert!("fly".parse::<DriverCommand>().is_err());
        assert!("".parse::<DriverCommand>().is_err());
    }

    #[test]
    fn switches_apply_immediately() {
        let mut controls = Controls::new();
        let mut driver = DriverInputs::default();
        controls.handle(DriverCommand::ShiftDown, &mut driver);
        controls.handle(DriverCommand::Engine(true), &mut driver);
        controls.handle(DriverCommand::Lock(true), &mut driver);

        assert_eq!(driver.shift_lever, ShiftLever::Reverse);
        assert!(driver.engine_on);
        assert_eq!(driver.door_lock, 1);
    }
}
