//! Error types for the WebSocket protocol implementation.
//!
//! This module defines all error conditions that can occur during WebSocket
//! operations, following RFC 6455 requirements.

use thiserror::Error;

use crate::connection::ConnectionState;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed frame per the protocol's structural rules: bad RSV bits,
    /// invalid opcode, invalid fragmentation sequencing, oversized control
    /// frame, invalid close code or close payload length.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A frame requested a feature this implementation does not support
    /// (per-message compression via RSV1).
    #[error("Unsupported data: {0}")]
    UnsupportedData(String),

    /// Cumulative or single-frame payload exceeds the configured maximum,
    /// or a 64-bit length exceeds the 2^53 - 1 ceiling.
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge {
        /// Declared or accumulated payload size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Invalid WebSocket handshake (missing upgrade prerequisites on the
    /// server side, accept-digest mismatch or non-upgrade response on the
    /// client side).
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake data exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Actual handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A header value would corrupt the wire format (CR/LF injection).
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// The offending header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// send/ping/pong/close called while the connection is not open.
    /// Reported synchronously; no transport I/O occurs.
    #[error("WebSocket is not open: state {0}")]
    InvalidState(ConnectionState),

    /// Invalid close status code for an outgoing close frame.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// The peer ended the byte stream.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Underlying byte-stream failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
