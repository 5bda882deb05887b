//! Common error types for the testbed core

use thiserror::Error;

/// Result type for core operations
pub type TestbedResult<T> = Result<T, TestbedError>;

/// Errors raised while building frames or applying ECU updates
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TestbedError {
    /// Arbitration id does not fit in 29 bits
    #[error("Invalid CAN id: 0x{0:X}")]
    InvalidCanId(u32),

    /// Payload too long for the frame type
    #[error("Payload of {len} bytes exceeds {max} bytes for {kind} frame")]
    PayloadTooLong {
        len: usize,
        max: usize,
        kind: &'static str,
    },

    /// Raw frame bytes could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Value does not fit the width declared for the field
    #[error("Value 0x{value:X} out of range for field {field}")]
    ValueOutOfRange { field: &'static str, value: u32 },

    /// ECU role name not recognised
    #[error("Unknown ECU role: {0}")]
    UnknownRole(String),

    /// Shift lever character not recognised
    #[error("Invalid shift lever position: {0}")]
    InvalidShiftLever(String),
}
