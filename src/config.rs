//! Configuration for WebSocket connections.

/// Default maximum payload size per message: 2 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 2 * 1024 * 1024;

/// WebSocket connection configuration.
///
/// Limits bound memory usage against misbehaving peers; buffer sizes tune
/// the transport read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum payload size of a complete message in bytes, counted across
    /// all fragments of an in-progress message.
    ///
    /// A value of 0 disables the limit.
    ///
    /// Default: 2 MiB
    pub max_payload: usize,

    /// Read buffer size for each transport read (in bytes).
    ///
    /// Default: 8 KiB
    pub read_buffer_size: usize,

    /// High-water mark for buffered-but-unparsed receiver bytes.
    ///
    /// When the receiver holds more than this many undigested bytes, it
    /// signals the connection to stop reading from the transport until the
    /// backlog drains.
    ///
    /// Default: 1 MiB
    pub recv_high_water: usize,

    /// Maximum size of handshake data in bytes.
    ///
    /// Default: 8 KiB
    pub max_handshake_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            read_buffer_size: 8192,
            recv_high_water: 1024 * 1024,
            max_handshake_size: 8192,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum message payload size. 0 disables the limit.
    #[must_use]
    pub const fn with_max_payload(mut self, size: usize) -> Self {
        self.max_payload = size;
        self
    }

    /// Set the read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the receiver backpressure high-water mark.
    #[must_use]
    pub const fn with_recv_high_water(mut self, size: usize) -> Self {
        self.recv_high_water = size;
        self
    }

    /// Set the maximum handshake size.
    #[must_use]
    pub const fn with_max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Configuration for the server role.
    #[must_use]
    pub fn server() -> Self {
        Self::default()
    }

    /// Configuration for the client role.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }
}
