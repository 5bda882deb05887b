//! testbed-serial - Dashboard ↔ ECU byte channels
//!
//! Each simulated ECU sits at the far end of a serial-like byte stream (a
//! socat pty pair in practice). Commands go out as `EXD` lines, status comes
//! back as `EXU` lines.
//!
//! ```text
//!  CarState ──► TopicHub("chassis") ──► Sender ──► "EXD 0064 0100 …\r" ──► ECU
//!                                                                          │
//!  CarState ◄── mpsc<EcuEvent> ◄── Reader ◄── "EXU 0004A …\n\n" ◄──────────┘
//! ```
//!
//! - [`protocol`] - EXD encoder, EXU decoder, two-linefeed frame accumulator
//! - [`ChannelEndpoint`] - owns one byte stream, hands out its halves once
//! - [`Reader`] - one task per ECU channel, posts [`EcuEvent`]s
//! - [`Sender`] - one task per outbound topic, single writer per handle

pub mod channel;
pub mod error;
pub mod protocol;
pub mod reader;
pub mod sender;
pub mod topic;

pub use channel::{BoxedReader, BoxedWriter, ChannelEndpoint, DEFAULT_BAUD_RATE};
pub use error::{ChannelError, ChannelResult};
pub use protocol::{decode_exu, decode_for, encode_exd, FrameAccumulator};
pub use reader::{EcuEvent, Reader, DEFAULT_READ_TIMEOUT};
pub use sender::Sender;
pub use topic::TopicHub;
