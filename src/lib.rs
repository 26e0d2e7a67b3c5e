//! # wscore - WebSocket Protocol Engine
//!
//! `wscore` is an RFC 6455 compliant WebSocket protocol implementation: a
//! bidirectional, message-oriented channel layered over a byte-stream
//! transport.
//!
//! ## Features
//!
//! - **Sans-IO protocol core**: the frame receiver is an incremental state
//!   machine fed byte chunks of arbitrary size, usable without any runtime
//! - **Strict validation** of framing invariants, close codes and the
//!   handshake key exchange
//! - **Zero-copy sends**: frames go out as header + caller payload, masked
//!   in place
//! - **Client and server** handshake drivers over any tokio duplex stream
//! - **Typed event surface** with priority-ordered subscriber dispatch
//!
//! Per-message compression is deliberately unsupported: a frame declaring
//! RSV1 is a fatal error.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wscore::{Config, Event, connect_tcp};
//!
//! let mut conn = connect_tcp("ws://localhost:9001/", &[], Config::client()).await?;
//! conn.send_text("Hello").await?;
//! while let Some(event) = conn.next_event().await? {
//!     if let Event::Message { payload, .. } = event {
//!         println!("{}", String::from_utf8_lossy(&payload));
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;

pub use config::Config;
pub use connection::{ConnectionState, Role};
pub use error::{Error, Result};
pub use events::{Event, EventHandlers};
pub use protocol::{
    CloseCode, FrameReceiver, FrameSender, OpCode, ReceiverEvent, SendOptions, WS_GUID,
    compute_accept_key, is_valid_status_code,
};

#[cfg(feature = "async-tokio")]
pub use connection::{Connection, accept, accept_parsed, connect, connect_tcp};
