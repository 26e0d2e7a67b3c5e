//! Outgoing WebSocket frame construction (RFC 6455 Section 5).
//!
//! [`FrameSender`] turns messages and control payloads into wire frames. A
//! frame is returned as two segments, header and payload; the payload is the
//! caller's buffer, masked in place when the sender masks — it is never
//! copied, which keeps large sends zero-copy. Callers must not reuse a
//! payload buffer after handing it over.

use crate::error::{Error, Result};
use crate::protocol::close::is_valid_status_code;
use crate::protocol::mask::apply_mask_fast;
use crate::protocol::opcode::OpCode;
use crate::protocol::receiver::MAX_CONTROL_FRAME_PAYLOAD;

/// Options for sending a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// True for a binary message, false for text.
    pub binary: bool,
    /// True when this frame completes the message.
    pub fin: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            binary: false,
            fin: true,
        }
    }
}

/// A wire frame as two independently written segments.
pub type FrameParts = (Vec<u8>, Vec<u8>);

/// Construct a frame header for `payload` and mask the payload in place if a
/// key is given.
///
/// Header layout: 2 bytes, +2 for a 16-bit extended length (126..65536),
/// +8 for a 64-bit extended length (>= 65536), +4 for the mask key.
#[must_use]
pub fn make_frame(
    mut payload: Vec<u8>,
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
) -> FrameParts {
    let mut offset = if mask.is_some() { 6 } else { 2 };
    let len = payload.len();

    let indicator: u8 = if len >= 65536 {
        offset += 8;
        127
    } else if len > 125 {
        offset += 2;
        126
    } else {
        len as u8
    };

    let mut header = vec![0u8; offset];

    header[0] = opcode.as_u8();
    if fin {
        header[0] |= 0x80;
    }

    header[1] = indicator;
    if mask.is_some() {
        header[1] |= 0x80;
    }

    if indicator == 126 {
        header[2..4].copy_from_slice(&(len as u16).to_be_bytes());
    } else if indicator == 127 {
        header[2..10].copy_from_slice(&(len as u64).to_be_bytes());
    }

    if let Some(key) = mask {
        header[offset - 4..].copy_from_slice(&key);
        apply_mask_fast(&mut payload, key);
    }

    (header, payload)
}

/// Frame encoder for one direction of a connection.
///
/// Stateless across calls except for the fragmentation bookkeeping: `first`
/// is true when the next data frame starts a new message.
pub struct FrameSender {
    first: bool,
    masking: bool,
    mask_state: u32,
}

impl FrameSender {
    /// Create a sender. `masking` is true for the client role.
    #[must_use]
    pub fn new(masking: bool) -> Self {
        Self {
            first: true,
            masking,
            mask_state: random_mask_seed(),
        }
    }

    /// Whether this sender masks outgoing frames.
    #[must_use]
    pub fn is_masking(&self) -> bool {
        self.masking
    }

    /// Fresh 4-byte mask key per frame: a counter stepped through two rounds
    /// of multiply-xorshift mixing, seeded from the OS entropy pool.
    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_state = self.mask_state.wrapping_add(0x9E37_79B9);
        let a = self.mask_state;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }

    fn next_mask(&mut self) -> Option<[u8; 4]> {
        self.masking.then(|| self.generate_mask())
    }

    /// Encode one data frame of a message.
    ///
    /// The first frame of a message carries the text/binary opcode; further
    /// frames carry the continuation opcode. A frame with `fin` set completes
    /// the message and readies the sender for the next independent one.
    pub fn data_frame(&mut self, payload: Vec<u8>, options: SendOptions) -> FrameParts {
        let mut opcode = if options.binary {
            OpCode::Binary
        } else {
            OpCode::Text
        };

        if self.first {
            self.first = false;
        } else {
            opcode = OpCode::Continuation;
        }

        if options.fin {
            self.first = true;
        }

        let mask = self.next_mask();
        make_frame(payload, options.fin, opcode, mask)
    }

    /// Encode a ping frame. Always FIN, independent of fragmentation state.
    pub fn ping_frame(&mut self, payload: Vec<u8>) -> Result<FrameParts> {
        self.control_frame(OpCode::Ping, payload)
    }

    /// Encode a pong frame. Always FIN, independent of fragmentation state.
    pub fn pong_frame(&mut self, payload: Vec<u8>) -> Result<FrameParts> {
        self.control_frame(OpCode::Pong, payload)
    }

    /// Encode a close frame.
    ///
    /// The payload is the big-endian status code followed by the UTF-8
    /// reason, or empty when no code is given. Codes that are not valid wire
    /// values are rejected before anything touches the transport.
    pub fn close_frame(&mut self, code: Option<u16>, reason: &str) -> Result<FrameParts> {
        let payload = match code {
            None => Vec::new(),
            Some(code) => {
                if !is_valid_status_code(code) {
                    return Err(Error::InvalidCloseCode(code));
                }
                let mut buf = Vec::with_capacity(2 + reason.len());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(reason.as_bytes());
                buf
            }
        };

        self.control_frame(OpCode::Close, payload)
    }

    fn control_frame(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<FrameParts> {
        if payload.len() as u64 > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::Protocol(format!(
                "control frame payload too large: {} bytes",
                payload.len()
            )));
        }

        let mask = self.next_mask();
        Ok(make_frame(payload, true, opcode, mask))
    }
}

/// Seed for mask generation, falling back to system time if the entropy pool
/// is unavailable.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
    }
}
