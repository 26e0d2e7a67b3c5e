//! WebSocket opening handshake (RFC 6455 Section 4).
//!
//! This module handles the HTTP Upgrade mechanism for establishing WebSocket
//! connections: request/response parsing and formatting, key generation, and
//! the accept-digest computation. It performs no I/O; the connection drivers
//! feed it raw bytes.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wscore::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a random Sec-WebSocket-Key: 16 random bytes, base64-encoded.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::InvalidHandshake(format!("key generation failed: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Locate the end of an HTTP head (the `\r\n\r\n` terminator).
///
/// Returns the index one past the terminator, i.e. the offset of the first
/// byte that belongs to the upgraded stream.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Parse HTTP headers from an iterator of lines into a case-insensitive map.
///
/// Duplicates of security-critical headers are rejected when
/// `security_headers` is provided.
fn parse_headers<'a, I>(
    lines: I,
    security_headers: Option<&[&str]>,
) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name_lower = name.trim().to_lowercase();

            if let Some(sec_headers) = security_headers
                && sec_headers.contains(&name_lower.as_str())
                && headers.contains_key(&name_lower)
            {
                return Err(Error::InvalidHandshake(format!(
                    "Duplicate header: {}",
                    name.trim()
                )));
            }

            headers.insert(name_lower, value.trim().to_string());
        }
    }

    Ok(headers)
}

/// Reject header values that would allow CR/LF injection.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// A parsed WebSocket upgrade request from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// The request path (e.g., "/chat").
    pub path: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version (8 or 13).
    pub version: u8,
    /// All request headers, lowercase names.
    pub headers: HashMap<String, String>,
}

impl UpgradeRequest {
    /// Parse and validate a WebSocket upgrade request from raw HTTP data.
    ///
    /// Prerequisites per RFC 6455: method GET, `Upgrade: websocket`
    /// (case-insensitive), a `Sec-WebSocket-Key`, and `Sec-WebSocket-Version`
    /// of 8 or 13. Any violation is an [`Error::InvalidHandshake`], surfaced
    /// before the caller writes a single response byte.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        // Request line: "GET /path HTTP/1.1"
        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        }

        if parts[0] != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {}",
                parts[0]
            )));
        }

        let path = parts[1].to_string();

        let security_headers = [
            "upgrade",
            "connection",
            "sec-websocket-key",
            "sec-websocket-version",
        ];
        let headers = parse_headers(lines, Some(&security_headers))?;

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let key = headers
            .get("sec-websocket-key")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))?
            .clone();
        if key.is_empty() {
            return Err(Error::InvalidHandshake("Empty Sec-WebSocket-Key".into()));
        }

        let version_str = headers.get("sec-websocket-version").ok_or_else(|| {
            Error::InvalidHandshake("Missing Sec-WebSocket-Version header".into())
        })?;
        let version: u8 = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;
        if version != 8 && version != 13 {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {version}"
            )));
        }

        Ok(Self {
            path,
            key,
            version,
            headers,
        })
    }

    /// Parse an upgrade request with a size limit.
    pub fn parse_with_limit(data: &[u8], max_size: usize) -> Result<Self> {
        if data.len() > max_size {
            return Err(Error::HandshakeTooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        Self::parse(data)
    }

    /// Compute the accept digest this request's key demands.
    #[must_use]
    pub fn accept_key(&self) -> String {
        compute_accept_key(&self.key)
    }
}

/// A WebSocket upgrade response (101 Switching Protocols).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// Additional response headers supplied by the caller.
    pub extra_headers: Vec<(String, String)>,
}

impl UpgradeResponse {
    /// Create a response answering the given request.
    #[must_use]
    pub fn from_request(req: &UpgradeRequest) -> Self {
        Self {
            accept: req.accept_key(),
            extra_headers: Vec::new(),
        }
    }

    /// Attach caller-supplied response headers.
    #[must_use]
    pub fn with_extra_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.extra_headers = headers;
        self
    }

    /// Serialize the raw HTTP response.
    ///
    /// # Errors
    /// Returns [`Error::InvalidHeaderValue`] if an extra header contains
    /// CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        for (name, value) in &self.extra_headers {
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a server's handshake response from raw HTTP data.
    ///
    /// Anything other than a `101` upgrade with the required headers is an
    /// [`Error::InvalidHandshake`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

        if !status_line.starts_with("HTTP/1.1 101") {
            return Err(Error::InvalidHandshake(format!(
                "Unexpected server response: {status_line}"
            )));
        }

        let headers = parse_headers(lines, None)?;

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        Ok(Self {
            accept,
            extra_headers: Vec::new(),
        })
    }

    /// Verify the accept digest against the key the client sent.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept != compute_accept_key(key) {
            return Err(Error::InvalidHandshake(
                "Invalid Sec-WebSocket-Accept header".into(),
            ));
        }
        Ok(())
    }
}

/// Build the raw client upgrade request.
///
/// Caller headers are appended after the required set; CR/LF injection is
/// rejected.
pub fn client_request(
    host: &str,
    path: &str,
    key: &str,
    extra_headers: &[(String, String)],
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(format!("GET {path} HTTP/1.1\r\n").as_bytes());
    buf.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(format!("Sec-WebSocket-Key: {key}\r\n").as_bytes());
    buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");

    for (name, value) in extra_headers {
        validate_header_value(name, value)?;
        buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }

    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}
