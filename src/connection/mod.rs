//! WebSocket connection management and lifecycle state machine.
//!
//! This module provides the core [`Connection`] type plus the client and
//! server handshake drivers that produce one.
//!
//! ## Connection Lifecycle
//!
//! 1. **Connecting** - handshake in flight
//! 2. **Open** - transport assigned, bidirectional traffic allowed
//! 3. **Closing** - teardown in progress
//! 4. **Closed** - terminal, transport destroyed
//!
//! ## Example
//!
//! ```rust,ignore
//! use wscore::{Config, Event, connection};
//!
//! let stream = tokio::net::TcpStream::connect("example.com:80").await?;
//! let mut conn = connection::connect(stream, "ws://example.com/chat", &[], Config::client()).await?;
//!
//! conn.send_text("Hello").await?;
//! while let Some(event) = conn.next_event().await? {
//!     println!("{event:?}");
//! }
//! ```

mod role;
mod state;

pub use role::Role;
pub use state::ConnectionState;

#[cfg(feature = "async-tokio")]
mod client;
#[cfg(feature = "async-tokio")]
#[allow(clippy::module_inception)]
mod connection;
#[cfg(feature = "async-tokio")]
mod server;

#[cfg(feature = "async-tokio")]
pub use client::{WsUrl, connect, connect_tcp};
#[cfg(feature = "async-tokio")]
pub use connection::Connection;
#[cfg(feature = "async-tokio")]
pub use server::{accept, accept_parsed};
