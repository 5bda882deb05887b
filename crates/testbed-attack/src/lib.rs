//! testbed-attack - Malicious traffic and bus inspection
//!
//! Attacks write straight to a raw CAN transport and never touch the car
//! state. Every attack runs on its own task, so several can overlap.
//!
//! - [`pattern`] - burst, single shot, pulsed, random flood and fuzz senders
//! - [`Attack`] - the catalogue of canned attacks and their parameters
//! - [`launch`] - fire-and-forget execution with logged failure
//! - [`SniffSession`] - filtered capture into a display queue
//! - [`Injector`] - paced replay of one frame, cancellable

pub mod catalogue;
pub mod error;
pub mod injector;
pub mod launcher;
pub mod pattern;
pub mod sniffer;

pub use catalogue::{Attack, AttackPlan};
pub use error::{AttackError, AttackResult};
pub use injector::{Injector, ReplayRequest, REPLAY_FREQUENCIES, MAX_INJECTIONS};
pub use launcher::{launch, launch_with, reap_detached, spawn_sniffer, AttackTarget};
pub use sniffer::{SniffRow, SniffSession};
