//! Client side of the opening handshake.
//!
//! [`connect`] performs the HTTP upgrade over a caller-supplied duplex
//! stream; the stream for `wss://` URLs is expected to already carry TLS
//! (termination is the transport's concern, not this crate's).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::Config;
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::handshake::{
    UpgradeResponse, client_request, find_head_end, generate_key,
};

/// A parsed `ws://` / `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// True for `wss`.
    pub secure: bool,
    /// Host name or address.
    pub host: String,
    /// Port, defaulted from the scheme (80 / 443) when absent.
    pub port: u16,
    /// Path plus query, always starting with `/`.
    pub path: String,
}

impl WsUrl {
    /// Parse a WebSocket URL. Any scheme other than `ws` or `wss` is
    /// rejected.
    pub fn parse(url: &str) -> Result<Self> {
        let (secure, rest) = if let Some(rest) = url.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = url.strip_prefix("wss://") {
            (true, rest)
        } else {
            return Err(Error::InvalidHandshake(format!(
                "Url protocol must be ws or wss, got {url}"
            )));
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, "/".to_string()),
        };

        if authority.is_empty() {
            return Err(Error::InvalidHandshake("missing host".into()));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| Error::InvalidHandshake(format!("invalid port: {port}")))?;
                (host.to_string(), port)
            }
            None => (
                authority.to_string(),
                if secure { 443 } else { 80 },
            ),
        };

        Ok(Self {
            secure,
            host,
            port,
            path,
        })
    }

    /// The Host header value: `host` alone on the scheme's default port,
    /// `host:port` otherwise.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = if self.secure { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Perform the client handshake over an established stream and return an
/// open [`Connection`].
///
/// Generates a random key, writes the upgrade request with any caller
/// headers, then validates the response: anything but a `101` upgrade, or an
/// accept digest that does not match the key, aborts with
/// [`Error::InvalidHandshake`] before a connection exists. Bytes read past
/// the response head are re-injected as the connection's first input.
pub async fn connect<T>(
    mut io: T,
    url: &str,
    extra_headers: &[(String, String)],
    config: Config,
) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let parsed = WsUrl::parse(url)?;
    let key = generate_key()?;

    let request = client_request(&parsed.host_header(), &parsed.path, &key, extra_headers)?;
    io.write_all(&request).await?;
    io.flush().await?;

    // Read up to the end of the response head.
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

    let response = UpgradeResponse::parse(&buf[..head_end])?;
    response.verify(&key)?;

    debug!(host = %parsed.host, path = %parsed.path, "client handshake complete");

    Connection::with_head(io, Role::Client, config, &buf[head_end..])
}

/// Dial a plain TCP transport for a `ws://` URL and connect over it.
///
/// `wss://` needs a TLS stream; establish one and use [`connect`] directly.
pub async fn connect_tcp(
    url: &str,
    extra_headers: &[(String, String)],
    config: Config,
) -> Result<Connection<tokio::net::TcpStream>> {
    let parsed = WsUrl::parse(url)?;
    if parsed.secure {
        return Err(Error::InvalidHandshake(
            "wss requires an established TLS stream; use connect() with one".into(),
        ));
    }

    let stream = tokio::net::TcpStream::connect((parsed.host.as_str(), parsed.port)).await?;
    connect(stream, url, extra_headers, config).await
}
