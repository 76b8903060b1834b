//! Close-handshake bookkeeping for an upgraded stream.

use std::fmt;

/// Where an upgraded stream is in its close handshake.
///
/// A [`WebSocketStream`](super::WebSocketStream) starts `Open`; the opening
/// handshake is finished before one is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Data flows both ways.
    Open,
    /// Our close frame is on the wire; the server's has not arrived.
    Closing,
    /// Both close frames were exchanged, or the server broke the protocol.
    Closed,
}

impl ConnectionState {
    /// Data and control frames may still be written.
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// The server may still deliver frames, at least its close frame.
    #[must_use]
    pub const fn can_receive(self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
