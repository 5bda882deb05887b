//! EXD / EXU line protocol
//!
//! Outbound (dashboard → ECU), one line per update:
//!
//! ```text
//! EXD 0064 0100 02168 0350 … \r
//!     ││└┴─ value, upper-case hex, no padding
//!     └┴─── two hex digit field code
//! ```
//!
//! Inbound (ECU → dashboard) uses the same token format behind an `EXU `
//! prefix. Framing on the inbound side is by linefeeds: the first `\n` of a
//! frame is a sentinel and is dropped, the second one ends the frame, every
//! other byte is payload. Because ECUs terminate each line with a single
//! `\n`, two status lines are often merged into one frame
//! (`EXU 0004AEXU 0107`); the decoder strips every `EXU` so both halves
//! still parse.

use testbed_core::{EcuRole, FieldUpdate};

const EXD_PREFIX: &str = "EXD";
const EXU_PREFIX: &str = "EXU ";
const EXU_TAG: &str = "EXU";

/// Render updates as one EXD command line (terminated by `\r`)
pub fn encode_exd(updates: &[FieldUpdate]) -> String {
    let mut line = String::from(EXD_PREFIX);
    for update in updates {
        line.push(' ');
        line.push_str(&update.to_string());
    }
    line.push('\r');
    line
}

/// Parse one inbound frame
///
/// Returns `None` when the frame is not an EXU frame. Tokens that are not
/// `<2 hex digit code><hex value>` are dropped individually.
pub fn decode_exu(frame: &str) -> Option<Vec<FieldUpdate>> {
    if !frame.starts_with(EXU_PREFIX) {
        return None;
    }

    let body = frame.replace(EXU_TAG, " ");
    let updates = body
        .split_whitespace()
        .filter_map(|token| {
            let update = parse_token(token);
            if update.is_none() {
                tracing::debug!(token, "Dropping malformed EXU token");
            }
            update
        })
        .collect();
    Some(updates)
}

/// Parse one inbound frame and keep only the codes `role` defines
pub fn decode_for(role: EcuRole, frame: &str) -> Option<Vec<FieldUpdate>> {
    decode_exu(frame).map(|updates| {
        updates
            .into_iter()
            .filter(|u| role.field(u.field_index).is_some())
            .collect()
    })
}

fn parse_token(token: &str) -> Option<FieldUpdate> {
    let code = token.get(..2)?;
    let value = token.get(2..)?;
    if value.is_empty() {
        return None;
    }
    let code = u8::from_str_radix(code, 16).ok()?;
    let value = u32::from_str_radix(value, 16).ok()?;
    Some(FieldUpdate::new(code, value))
}

/// Byte-at-a-time frame assembler for the two-linefeed rule
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    seen_sentinel: bool,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one byte, returning a frame when it completes one
    pub fn push(&mut self, byte: u8) -> Option<String> {
        if byte != b'\n' {
            self.buf.push(byte);
            return None;
        }
        if !self.seen_sentinel {
            self.seen_sentinel = true;
            return None;
        }

        self.seen_sentinel = false;
        let frame = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(frame)
    }

    /// Push a chunk, returning every frame it completes, in order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Bytes buffered for the frame in progress
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
