//! Incremental WebSocket frame receiver (RFC 6455 Section 5).
//!
//! [`FrameReceiver`] is a sans-IO state machine: the connection feeds it byte
//! chunks of arbitrary size as they arrive off the transport, and it emits
//! fully reassembled messages and control events. No frame alignment to chunk
//! boundaries is assumed; whenever a state cannot complete with the bytes on
//! hand, parsing suspends and resumes on the next chunk.
//!
//! Fed bytes are kept in a queue of chunks and consumed exactly as needed, so
//! a pending backlog is never recopied on every call.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::close::is_valid_status_code;
use crate::protocol::mask::apply_mask_fast;
use crate::protocol::opcode::OpCode;

/// Largest payload length the receiver will accept: 2^53 - 1.
///
/// 64-bit length fields above this ceiling are rejected outright rather than
/// trusted into length arithmetic.
pub const MAX_SAFE_PAYLOAD: u64 = (1 << 53) - 1;

/// Maximum payload size for control frames (RFC 6455 Section 5.5).
pub const MAX_CONTROL_FRAME_PAYLOAD: u64 = 125;

/// Events produced by the receiver, in strict reception order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A complete data message (single frame or reassembled fragments).
    Message {
        /// Concatenated payload of all fragments.
        payload: Vec<u8>,
        /// True when the message opcode was binary (0x2).
        is_binary: bool,
    },
    /// A ping control frame.
    Ping(Vec<u8>),
    /// A pong control frame.
    Pong(Vec<u8>),
    /// A close control frame. Terminates parsing for this receiver.
    Conclude {
        /// Close status code; 1005 when the close payload was empty.
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadInfo,
    ReadPayloadLength16,
    ReadPayloadLength64,
    ReadMask,
    ReadData,
    Closed,
}

/// Incremental frame parsing state machine.
pub struct FrameReceiver {
    state: State,

    chunks: VecDeque<Bytes>,
    buffered: usize,

    // Current frame
    fin: bool,
    opcode: OpCode,
    masked: bool,
    mask: [u8; 4],
    payload_len: u64,

    // In-progress fragmented message
    fragmented: Option<OpCode>,
    fragments: Vec<Bytes>,
    total_payload: u64,

    events: VecDeque<ReceiverEvent>,

    max_payload: usize,
    high_water: usize,
}

impl FrameReceiver {
    /// Create a receiver.
    ///
    /// `max_payload` bounds the cumulative payload of one message; 0 disables
    /// the limit. `high_water` is the buffered-byte threshold above which
    /// [`wants_input`](Self::wants_input) asks the transport to pause.
    #[must_use]
    pub fn new(max_payload: usize, high_water: usize) -> Self {
        Self {
            state: State::ReadInfo,
            chunks: VecDeque::new(),
            buffered: 0,
            fin: false,
            opcode: OpCode::Continuation,
            masked: false,
            mask: [0; 4],
            payload_len: 0,
            fragmented: None,
            fragments: Vec::new(),
            total_payload: 0,
            events: VecDeque::new(),
            max_payload,
            high_water,
        }
    }

    /// Feed one chunk of transport bytes and run the parse loop.
    ///
    /// Input arriving after the receiver concluded or failed is discarded.
    /// A fatal error latches the receiver closed; no further events are
    /// produced after it.
    pub fn feed(&mut self, chunk: impl Into<Bytes>) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }

        let chunk = chunk.into();
        self.buffered += chunk.len();
        self.chunks.push_back(chunk);

        self.run_loop().inspect_err(|_| {
            self.state = State::Closed;
        })
    }

    /// Take the next queued event, oldest first.
    pub fn next_event(&mut self) -> Option<ReceiverEvent> {
        self.events.pop_front()
    }

    /// Whether the receiver can accept more input right now.
    ///
    /// False while undrained events are queued (downstream has not consumed
    /// them) or while the buffered backlog exceeds the high-water mark and is
    /// already enough to complete the current state. The connection pauses
    /// transport reads while this is false and resumes once events drain.
    #[must_use]
    pub fn wants_input(&self) -> bool {
        if self.state == State::Closed {
            return false;
        }
        if !self.events.is_empty() {
            return false;
        }
        self.buffered < self.needed_bytes().max(self.high_water)
    }

    /// Whether the receiver has reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Bytes buffered but not yet parsed.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    fn needed_bytes(&self) -> usize {
        match self.state {
            State::ReadInfo | State::ReadPayloadLength16 => 2,
            State::ReadPayloadLength64 => 8,
            State::ReadMask => 4,
            State::ReadData => usize::try_from(self.payload_len).unwrap_or(usize::MAX),
            State::Closed => 0,
        }
    }

    /// Take exactly `n` buffered bytes, possibly spanning chunk boundaries.
    ///
    /// Callers must have checked `self.buffered >= n`.
    fn consume(&mut self, n: usize) -> Bytes {
        debug_assert!(self.buffered >= n);
        self.buffered -= n;

        if let Some(first) = self.chunks.front_mut() {
            if n < first.len() {
                return first.split_to(n);
            }
            if n == first.len() {
                return self.chunks.pop_front().unwrap_or_default();
            }
        }

        let mut dst = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let Some(mut chunk) = self.chunks.pop_front() else {
                break;
            };
            if chunk.len() <= remaining {
                remaining -= chunk.len();
                dst.extend_from_slice(&chunk);
            } else {
                dst.extend_from_slice(&chunk.split_to(remaining));
                remaining = 0;
                self.chunks.push_front(chunk);
            }
        }
        dst.freeze()
    }

    /// Drive the state machine until it suspends or concludes.
    fn run_loop(&mut self) -> Result<()> {
        loop {
            let progressed = match self.state {
                State::ReadInfo => self.read_info()?,
                State::ReadPayloadLength16 => self.read_payload_length16()?,
                State::ReadPayloadLength64 => self.read_payload_length64()?,
                State::ReadMask => self.read_mask(),
                State::ReadData => self.read_data()?,
                State::Closed => false,
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    fn read_info(&mut self) -> Result<bool> {
        if self.buffered < 2 {
            return Ok(false);
        }

        let buf = self.consume(2);

        if (buf[0] & 0x30) != 0x00 {
            return Err(Error::Protocol("RSV2 and RSV3 must be clear".into()));
        }

        if (buf[0] & 0x40) == 0x40 {
            return Err(Error::UnsupportedData(
                "per-message compression is not supported".into(),
            ));
        }

        self.fin = (buf[0] & 0x80) == 0x80;
        let raw = buf[0] & 0x0f;
        self.payload_len = u64::from(buf[1] & 0x7f);
        self.masked = (buf[1] & 0x80) == 0x80;

        let Some(opcode) = OpCode::from_u8(raw) else {
            return Err(Error::Protocol(format!("invalid opcode {raw}")));
        };

        match opcode {
            OpCode::Continuation => {
                let Some(original) = self.fragmented else {
                    return Err(Error::Protocol("invalid opcode 0".into()));
                };
                // A continuation carries the opcode of the frame that
                // opened the sequence.
                self.opcode = original;
            }
            OpCode::Text | OpCode::Binary => {
                if self.fragmented.is_some() {
                    return Err(Error::Protocol(format!("invalid opcode {raw}")));
                }
                self.opcode = opcode;
            }
            OpCode::Close | OpCode::Ping | OpCode::Pong => {
                if !self.fin {
                    return Err(Error::Protocol("FIN must be set".into()));
                }
                if self.payload_len > MAX_CONTROL_FRAME_PAYLOAD {
                    return Err(Error::Protocol(format!(
                        "invalid payload length {}",
                        self.payload_len
                    )));
                }
                self.opcode = opcode;
            }
        }

        if !self.fin && self.fragmented.is_none() {
            self.fragmented = Some(self.opcode);
        }

        match self.payload_len {
            126 => {
                self.state = State::ReadPayloadLength16;
            }
            127 => {
                self.state = State::ReadPayloadLength64;
            }
            _ => self.have_length()?,
        }

        Ok(true)
    }

    fn read_payload_length16(&mut self) -> Result<bool> {
        if self.buffered < 2 {
            return Ok(false);
        }

        let buf = self.consume(2);
        self.payload_len = u64::from(u16::from_be_bytes([buf[0], buf[1]]));
        self.have_length()?;
        Ok(true)
    }

    fn read_payload_length64(&mut self) -> Result<bool> {
        if self.buffered < 8 {
            return Ok(false);
        }

        let buf = self.consume(8);
        let len = u64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);

        if len > MAX_SAFE_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                size: len,
                max: MAX_SAFE_PAYLOAD,
            });
        }

        self.payload_len = len;
        self.have_length()?;
        Ok(true)
    }

    /// Common length resolution: enforce the message payload limit for data
    /// frames, then route to mask or data reading.
    fn have_length(&mut self) -> Result<()> {
        if self.payload_len > 0 && self.opcode.is_data() {
            self.total_payload += self.payload_len;

            if self.max_payload > 0 && self.total_payload > self.max_payload as u64 {
                return Err(Error::PayloadTooLarge {
                    size: self.total_payload,
                    max: self.max_payload as u64,
                });
            }
        }

        self.state = if self.masked {
            State::ReadMask
        } else {
            State::ReadData
        };
        Ok(())
    }

    fn read_mask(&mut self) -> bool {
        if self.buffered < 4 {
            return false;
        }

        let buf = self.consume(4);
        self.mask = [buf[0], buf[1], buf[2], buf[3]];
        self.state = State::ReadData;
        true
    }

    fn read_data(&mut self) -> Result<bool> {
        let len = usize::try_from(self.payload_len).map_err(|_| Error::PayloadTooLarge {
            size: self.payload_len,
            max: usize::MAX as u64,
        })?;

        let data = if len > 0 {
            if self.buffered < len {
                return Ok(false);
            }

            let data = self.consume(len);
            if self.masked {
                let mut owned = data.to_vec();
                apply_mask_fast(&mut owned, self.mask);
                Bytes::from(owned)
            } else {
                data
            }
        } else {
            Bytes::new()
        };

        if self.opcode.is_control() {
            self.handle_control_frame(data)?;
        } else {
            if !data.is_empty() {
                self.fragments.push(data);
            }
            self.handle_data_frame();
        }
        Ok(true)
    }

    fn handle_control_frame(&mut self, data: Bytes) -> Result<()> {
        match self.opcode {
            OpCode::Close => {
                // Conclude terminates parsing for this receiver.
                self.state = State::Closed;

                if data.is_empty() {
                    self.events.push_back(ReceiverEvent::Conclude {
                        code: 1005,
                        reason: String::new(),
                    });
                } else if data.len() == 1 {
                    return Err(Error::Protocol("invalid payload length 1".into()));
                } else {
                    let code = u16::from_be_bytes([data[0], data[1]]);
                    if !is_valid_status_code(code) {
                        return Err(Error::Protocol(format!("invalid status code {code}")));
                    }
                    let reason = String::from_utf8_lossy(&data[2..]).into_owned();
                    self.events.push_back(ReceiverEvent::Conclude { code, reason });
                }
            }
            OpCode::Ping => {
                self.events.push_back(ReceiverEvent::Ping(data.to_vec()));
                self.state = State::ReadInfo;
            }
            _ => {
                self.events.push_back(ReceiverEvent::Pong(data.to_vec()));
                self.state = State::ReadInfo;
            }
        }
        Ok(())
    }

    fn handle_data_frame(&mut self) {
        if self.fin {
            let fragments = std::mem::take(&mut self.fragments);
            let is_binary = self.opcode == OpCode::Binary;
            let total = self.total_payload;

            self.total_payload = 0;
            self.fragmented = None;

            let payload = match fragments.len() {
                0 => Vec::new(),
                1 => fragments.into_iter().next().unwrap_or_default().to_vec(),
                _ => {
                    let mut buf =
                        Vec::with_capacity(usize::try_from(total).unwrap_or(usize::MAX));
                    for fragment in &fragments {
                        buf.extend_from_slice(fragment);
                    }
                    buf
                }
            };

            self.events
                .push_back(ReceiverEvent::Message { payload, is_binary });
        }

        self.state = State::ReadInfo;
    }
}
