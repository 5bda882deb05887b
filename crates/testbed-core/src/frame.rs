//! CAN / CAN-FD frame model and raw wire layout
//!
//! The byte layout follows the Linux `struct can_frame` / `struct canfd_frame`
//! used on raw CAN sockets:
//!
//! ```text
//! ┌──────────────┬─────┬───────┬──────────┬──────────────────────┐
//! │ can_id (LE)  │ len │ flags │ reserved │ data (8 or 64 bytes) │
//! │ 4 bytes      │ 1   │ 1     │ 2        │ zero padded          │
//! └──────────────┴─────┴───────┴──────────┴──────────────────────┘
//! ```
//!
//! No CRC is carried; the controller (or vcan) handles that.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TestbedError, TestbedResult};

/// Maximum payload of a classic CAN frame
pub const CAN_MAX_DLEN: usize = 8;
/// Maximum payload of a CAN-FD frame
pub const CANFD_MAX_DLEN: usize = 64;
/// Size of a classic frame on the wire
pub const CAN_MTU: usize = 16;
/// Size of a CAN-FD frame on the wire
pub const CANFD_MTU: usize = 72;

/// Highest 11-bit (standard) identifier
pub const CAN_SFF_MAX: u32 = 0x7FF;
/// Highest 29-bit (extended) identifier
pub const CAN_EFF_MAX: u32 = 0x1FFF_FFFF;

const CAN_EFF_FLAG: u32 = 0x8000_0000;
const CANFD_FDF: u8 = 0x04;

/// Valid CAN-FD payload lengths above 8 bytes
const FD_LENGTHS: [usize; 7] = [12, 16, 20, 24, 32, 48, 64];

/// An immutable CAN or CAN-FD data frame
///
/// Identifiers above `0x7FF` are carried as extended (29-bit) ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanFrame {
    id: u32,
    data: Vec<u8>,
    is_fd: bool,
}

impl CanFrame {
    /// Build a classic frame (0-8 data bytes)
    pub fn new(id: u32, data: &[u8]) -> TestbedResult<Self> {
        check_id(id)?;
        if data.len() > CAN_MAX_DLEN {
            return Err(TestbedError::PayloadTooLong {
                len: data.len(),
                max: CAN_MAX_DLEN,
                kind: "classic",
            });
        }
        Ok(Self {
            id,
            data: data.to_vec(),
            is_fd: false,
        })
    }

    /// Build a CAN-FD frame (0-64 data bytes)
    ///
    /// Payloads longer than 8 bytes are zero padded up to the next valid
    /// FD length (12, 16, 20, 24, 32, 48 or 64).
    pub fn new_fd(id: u32, data: &[u8]) -> TestbedResult<Self> {
        check_id(id)?;
        if data.len() > CANFD_MAX_DLEN {
            return Err(TestbedError::PayloadTooLong {
                len: data.len(),
                max: CANFD_MAX_DLEN,
                kind: "FD",
            });
        }
        let mut data = data.to_vec();
        data.resize(fd_padded_len(data.len()), 0);
        Ok(Self {
            id,
            data,
            is_fd: true,
        })
    }

    /// Build a classic frame for short payloads, FD from 8 bytes on
    ///
    /// This is the rule the replay injector uses for user-entered payloads.
    pub fn for_payload(id: u32, data: &[u8]) -> TestbedResult<Self> {
        if data.len() < CAN_MAX_DLEN {
            Self::new(id, data)
        } else {
            Self::new_fd(id, data)
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_fd(&self) -> bool {
        self.is_fd
    }

    /// Whether the id needs the 29-bit format
    pub fn is_extended(&self) -> bool {
        self.id > CAN_SFF_MAX
    }

    /// Data length code for this frame
    pub fn dlc(&self) -> u8 {
        let len = self.data.len();
        if len <= CAN_MAX_DLEN {
            return len as u8;
        }
        FD_LENGTHS
            .iter()
            .position(|&l| l >= len)
            .map(|i| 9 + i as u8)
            .unwrap_or(15)
    }

    /// Payload as space separated upper-case hex, e.g. `"FF 00 00"`
    pub fn hex_data(&self) -> String {
        self.data
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Encode into the raw socket layout (16 bytes classic, 72 bytes FD)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mtu = if self.is_fd { CANFD_MTU } else { CAN_MTU };
        let mut buf = vec![0u8; mtu];

        let raw_id = if self.is_extended() {
            self.id | CAN_EFF_FLAG
        } else {
            self.id
        };
        buf[0..4].copy_from_slice(&raw_id.to_le_bytes());
        buf[4] = self.data.len() as u8;
        buf[5] = if self.is_fd { CANFD_FDF } else { 0 };
        buf[8..8 + self.data.len()].copy_from_slice(&self.data);
        buf
    }

    /// Decode from the raw socket layout
    pub fn from_bytes(buf: &[u8]) -> TestbedResult<Self> {
        let is_fd = match buf.len() {
            CAN_MTU => false,
            CANFD_MTU => true,
            other => {
                return Err(TestbedError::MalformedFrame(format!(
                    "expected {} or {} bytes, got {}",
                    CAN_MTU, CANFD_MTU, other
                )))
            }
        };

        let raw_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let id = if raw_id & CAN_EFF_FLAG != 0 {
            raw_id & CAN_EFF_MAX
        } else {
            raw_id & CAN_SFF_MAX
        };

        let len = buf[4] as usize;
        let max = if is_fd { CANFD_MAX_DLEN } else { CAN_MAX_DLEN };
        if len > max {
            return Err(TestbedError::MalformedFrame(format!(
                "length field {} exceeds {}",
                len, max
            )));
        }

        let data = &buf[8..8 + len];
        if is_fd {
            Self::new_fd(id, data)
        } else {
            Self::new(id, data)
        }
    }
}

impl fmt::Display for CanFrame {
    /// candump style: `  043   [8]  FF 00 00 00 00 00 00 00`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended() {
            write!(f, "{:08X}", self.id)?;
        } else {
            write!(f, "{:>8}", format!("{:03X}", self.id))?;
        }
        if self.is_fd {
            write!(f, "  [{:02}]  {}", self.data.len(), self.hex_data())
        } else {
            write!(f, "   [{}]  {}", self.data.len(), self.hex_data())
        }
    }
}

fn check_id(id: u32) -> TestbedResult<()> {
    if id > CAN_EFF_MAX {
        return Err(TestbedError::InvalidCanId(id));
    }
    Ok(())
}

fn fd_padded_len(len: usize) -> usize {
    if len <= CAN_MAX_DLEN {
        return len;
    }
    FD_LENGTHS
        .iter()
        .copied()
        .find(|&l| l >= len)
        .unwrap_or(CANFD_MAX_DLEN)
}
