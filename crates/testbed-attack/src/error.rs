//! Attack errors

use testbed_can::TransportError;
use testbed_core::TestbedError;
use thiserror::Error;

pub type AttackResult<T> = Result<T, AttackError>;

#[derive(Debug, Error)]
pub enum AttackError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] TestbedError),

    #[error("Unsupported replay frequency {0} Hz (allowed: 2, 10, 20, 100)")]
    InvalidFrequency(u32),

    #[error("Injection count {0} outside 1..=1000")]
    InvalidCount(u32),

    #[error("Invalid hex input: {0}")]
    InvalidHex(String),

    #[error("Unknown attack: {0}")]
    UnknownAttack(String),

    #[error("Failed to start sniffer: {0}")]
    SnifferSpawn(String),

    #[error("Session already running")]
    AlreadyRunning,
}
