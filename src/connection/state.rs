//! WebSocket connection lifecycle states.

/// WebSocket connection state.
///
/// Transitions run strictly forward: Connecting to Open on handshake
/// success, Connecting or Open to Closing when either end starts teardown or
/// a fatal error occurs, Closing to Closed once the transport is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Handshake in flight.
    #[default]
    Connecting,
    /// Transport assigned; bidirectional traffic allowed.
    Open,
    /// Teardown in progress.
    Closing,
    /// Terminal; the transport is destroyed.
    Closed,
}

impl ConnectionState {
    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if receiving data is allowed in this state.
    ///
    /// Returns `true` for `Open` or `Closing`.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Closing)
    }

    /// Check if the connection has not yet fully closed.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
