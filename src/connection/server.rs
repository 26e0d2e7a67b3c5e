//! Server side of the opening handshake.
//!
//! [`accept`] upgrades an inbound HTTP request to a WebSocket connection.
//! All prerequisites are validated before a single response byte is written,
//! so a rejected client sees no partial upgrade.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::{UpgradeRequest, UpgradeResponse, find_head_end};

/// Read the upgrade request off the stream, validate it, write the raw
/// `101 Switching Protocols` response and return an open [`Connection`].
///
/// `extra_headers` are appended to the response. Bytes the read loop picked
/// up past the request head become the connection's first receiver input.
pub async fn accept<T>(
    mut io: T,
    extra_headers: Vec<(String, String)>,
    config: Config,
) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(256);
    let head_end = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() > config.max_handshake_size {
            return Err(Error::HandshakeTooLarge {
                size: buf.len(),
                max: config.max_handshake_size,
            });
        }

        let mut tmp = vec![0u8; 1024];
        let n = io.read(&mut tmp).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed before handshake completed".into(),
            ));
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let request = UpgradeRequest::parse_with_limit(&buf[..head_end], config.max_handshake_size)?;
    accept_parsed(io, &request, &buf[head_end..], extra_headers, config).await
}

/// Upgrade with a request an outer HTTP layer already read.
///
/// `head` is whatever that layer buffered past the request terminator; it is
/// re-injected ahead of live transport bytes.
pub async fn accept_parsed<T>(
    mut io: T,
    request: &UpgradeRequest,
    head: &[u8],
    extra_headers: Vec<(String, String)>,
    config: Config,
) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let response = UpgradeResponse::from_request(request).with_extra_headers(extra_headers);

    let mut out = Vec::with_capacity(256);
    response.write(&mut out)?;
    io.write_all(&out).await?;
    io.flush().await?;

    debug!(path = %request.path, version = request.version, "accepted websocket upgrade");

    Connection::with_head(io, Role::Server, config, head)
}
