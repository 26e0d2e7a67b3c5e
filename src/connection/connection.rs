use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::events::{Event, EventHandlers};
use crate::protocol::receiver::{FrameReceiver, ReceiverEvent};
use crate::protocol::sender::{FrameSender, SendOptions};

/// A WebSocket connection bound to an async duplex byte stream.
///
/// `Connection` owns one frame receiver and one frame sender for the lifetime
/// of its transport. It drives the connection lifecycle state machine,
/// translates wire frames into [`Event`]s, and enforces the send-only-while-
/// open contract.
///
/// ## Type Parameters
///
/// - `T`: The underlying async I/O stream (e.g., `TcpStream`, a TLS stream)
///
/// ## Example
///
/// ```rust,ignore
/// use wscore::{Config, Event, connect_tcp};
///
/// let mut conn = connect_tcp("ws://localhost:9001/chat", &[], Config::client()).await?;
/// conn.send_text("Hello").await?;
/// while let Some(event) = conn.next_event().await? {
///     println!("{event:?}");
/// }
/// ```
pub struct Connection<T> {
    id: String,
    io: T,
    role: Role,
    state: ConnectionState,
    config: Config,
    receiver: FrameReceiver,
    sender: FrameSender,
    pending_close: Option<(u16, String)>,
    opened_dispatched: bool,
}

/// Collision-resistant connection identifier: SHA-1 over wall-clock nanos,
/// the process id and fresh random bytes, base64-encoded. Uniqueness in
/// practice is all that is required of it.
fn generate_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let pid = std::process::id();
    let mut random = [0u8; 8];
    let _ = getrandom::getrandom(&mut random);

    let mut hasher = Sha1::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(pid.to_le_bytes());
    hasher.update(random);
    BASE64.encode(hasher.finalize())
}

/// Close code reported alongside a fatal receive error.
fn error_close_code(err: &Error) -> u16 {
    match err {
        Error::Protocol(_) => 1002,
        Error::UnsupportedData(_) => 1003,
        Error::PayloadTooLarge { .. } => 1009,
        _ => 1006,
    }
}

impl<T> Connection<T> {
    /// Wrap an already-upgraded stream in an open connection.
    ///
    /// The handshake must have completed; use the [`accept`](crate::accept)
    /// and [`connect`](crate::connect) drivers for the full upgrade flow.
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let receiver = FrameReceiver::new(config.max_payload, config.recv_high_water);
        let sender = FrameSender::new(role.must_mask());
        let id = generate_id();

        debug!(id = %id, role = %role, "websocket connection open");

        Self {
            id,
            io,
            role,
            state: ConnectionState::Open,
            config,
            receiver,
            sender,
            pending_close: None,
            opened_dispatched: false,
        }
    }

    /// Wrap an upgraded stream, re-injecting bytes the handshake layer read
    /// past the end of the HTTP head.
    ///
    /// Those bytes are the first input the receiver sees, ahead of any live
    /// transport reads.
    pub fn with_head(io: T, role: Role, config: Config, head: &[u8]) -> Result<Self> {
        let mut conn = Self::new(io, role, config);
        if !head.is_empty() {
            conn.receiver.feed(head.to_vec())?;
        }
        Ok(conn)
    }

    /// Unique opaque identifier of this connection.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The connection role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether messages can currently be sent and received.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    fn ensure_open(&self) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::InvalidState(self.state));
        }
        Ok(())
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Write one frame as header then payload, never interleaving with
    /// another frame's bytes, and flush.
    async fn write_frame(&mut self, header: &[u8], payload: &[u8]) -> Result<()> {
        self.io.write_all(header).await?;
        if !payload.is_empty() {
            self.io.write_all(payload).await?;
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Send a data message.
    ///
    /// With the default options this is a complete single-frame message; set
    /// `fin: false` to stream a message across several calls, finishing with
    /// a `fin: true` call.
    ///
    /// ## Errors
    ///
    /// - [`Error::InvalidState`] unless the connection is open; nothing is
    ///   written in that case
    /// - I/O errors from the underlying stream
    pub async fn send(&mut self, data: Vec<u8>, options: SendOptions) -> Result<()> {
        self.ensure_open()?;

        trace!(id = %self.id, len = data.len(), binary = options.binary, fin = options.fin, "send");
        let (header, payload) = self.sender.data_frame(data, options);
        self.write_frame(&header, &payload).await
    }

    /// Send a complete text message.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send(
            text.into().into_bytes(),
            SendOptions {
                binary: false,
                fin: true,
            },
        )
        .await
    }

    /// Send a complete binary message.
    pub async fn send_binary(&mut self, data: Vec<u8>) -> Result<()> {
        self.send(
            data,
            SendOptions {
                binary: true,
                fin: true,
            },
        )
        .await
    }

    /// Send a ping frame.
    pub async fn ping(&mut self, data: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let (header, payload) = self.sender.ping_frame(data)?;
        self.write_frame(&header, &payload).await
    }

    /// Send a pong frame.
    pub async fn pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        let (header, payload) = self.sender.pong_frame(data)?;
        self.write_frame(&header, &payload).await
    }

    /// Close the connection.
    ///
    /// Validates the code, sends the close frame, then tears the transport
    /// down. A no-op when teardown has already begun. The terminal `Close`
    /// event is observable through [`next_event`](Self::next_event).
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }

        // Invalid codes fail before the state changes or bytes move.
        let (header, payload) = self.sender.close_frame(Some(code), reason)?;

        debug!(id = %self.id, code, "closing connection");
        self.state = ConnectionState::Closing;
        self.write_frame(&header, &payload).await?;
        let _ = self.io.shutdown().await;
        self.state = ConnectionState::Closed;
        self.pending_close = Some((code, reason.to_string()));
        Ok(())
    }

    /// Pull the next event off the connection.
    ///
    /// Drains receiver events before touching the transport; reads are
    /// paused while the receiver reports it cannot accept input. Returns
    /// `Ok(None)` once the terminal `Close` event has been delivered.
    ///
    /// Incoming pings are answered with a pong before the `Ping` event is
    /// surfaced. A fatal protocol or transport error tears the connection
    /// down and is returned as `Err`; the connection is `Closed` afterwards.
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            if let Some(event) = self.receiver.next_event() {
                match event {
                    ReceiverEvent::Message { payload, is_binary } => {
                        return Ok(Some(Event::Message { payload, is_binary }));
                    }
                    ReceiverEvent::Ping(data) => {
                        if self.state.can_send() {
                            let (header, payload) = self.sender.pong_frame(data.clone())?;
                            self.write_frame(&header, &payload).await?;
                        }
                        return Ok(Some(Event::Ping(data)));
                    }
                    ReceiverEvent::Pong(data) => {
                        return Ok(Some(Event::Pong(data)));
                    }
                    ReceiverEvent::Conclude { code, reason } => {
                        return Ok(Some(self.concluded(code, reason).await));
                    }
                }
            }

            if let Some((code, reason)) = self.pending_close.take() {
                return Ok(Some(Event::Close { code, reason }));
            }

            if !self.state.can_receive() {
                return Ok(None);
            }

            // The event queue is drained at this point, so the receiver
            // wants input unless parsing already terminated.
            if !self.receiver.wants_input() {
                return Ok(None);
            }

            let mut buf = vec![0u8; self.config.read_buffer_size];
            let n = match self.io.read(&mut buf).await {
                Ok(n) => n,
                Err(err) => {
                    self.state = ConnectionState::Closed;
                    return Err(err.into());
                }
            };

            if n == 0 {
                // End of stream without a close frame.
                debug!(id = %self.id, "transport ended");
                self.state = ConnectionState::Closed;
                self.pending_close = Some((1006, String::new()));
                continue;
            }

            buf.truncate(n);
            if let Err(err) = self.receiver.feed(buf) {
                warn!(id = %self.id, error = %err, "fatal receive error");
                self.state = ConnectionState::Closing;
                let _ = self.io.shutdown().await;
                self.state = ConnectionState::Closed;
                return Err(err);
            }
        }
    }

    /// Peer-initiated close: echo a close frame, destroy the transport and
    /// produce the terminal event.
    async fn concluded(&mut self, code: u16, reason: String) -> Event {
        debug!(id = %self.id, code, "peer concluded");
        self.state = ConnectionState::Closing;

        // 1005 stands for an absent code; the echo carries no payload then.
        let echo = if code == 1005 { None } else { Some(code) };
        if let Ok((header, payload)) = self.sender.close_frame(echo, "") {
            let _ = self.write_frame(&header, &payload).await;
        }

        let _ = self.io.shutdown().await;
        self.state = ConnectionState::Closed;
        Event::Close { code, reason }
    }

    /// Drive the connection to completion, dispatching every event to the
    /// registered handlers.
    ///
    /// Emits `open` once on entry. On a fatal error, dispatches `error`
    /// followed by the terminal `close` and returns the error.
    pub async fn run(&mut self, handlers: &mut EventHandlers) -> Result<()> {
        if self.state == ConnectionState::Open && !self.opened_dispatched {
            self.opened_dispatched = true;
            handlers.dispatch(&Event::Open {
                id: self.id.clone(),
            });
        }

        loop {
            match self.next_event().await {
                Ok(Some(event)) => {
                    let terminal = matches!(event, Event::Close { .. });
                    handlers.dispatch(&event);
                    if terminal {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(err) => {
                    handlers.dispatch(&Event::Error(err.clone()));
                    handlers.dispatch(&Event::Close {
                        code: error_close_code(&err),
                        reason: String::new(),
                    });
                    return Err(err);
                }
            }
        }
    }
}
