//! Error types for WebSocket sessions.
//!
//! One error type covers both the setup phase (URL, resolution, connect, TLS,
//! opening handshake) and the steady state (frame I/O and protocol
//! violations). Use [`Error::phase`] to tell them apart.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The lifecycle phase an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Before the session reached `Connected`.
    Setup,
    /// After the opening handshake completed.
    Steady,
}

/// Errors that can occur while running a WebSocket session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The URL could not be parsed or lacks a host.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not one of `ws`, `wss`, `http`, `https`.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Host name resolution failed or returned no endpoints.
    #[error("Failed to resolve {host}:{port}: {reason}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Port string that was looked up.
        port: String,
        /// Resolver error message.
        reason: String,
    },

    /// No candidate endpoint accepted the TCP connection.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server's opening handshake response is malformed.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// The server answered the upgrade request with a non-101 status.
    #[error("Handshake rejected with status {status}")]
    HandshakeRejected {
        /// HTTP status code returned by the server.
        status: u16,
    },

    /// Handshake response exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Actual handshake size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A header value would break the request framing.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// `run` was called on a session that already ran.
    #[error("Session already ran")]
    AlreadyRun,

    /// The connection is not open (never connected, or close handshake started).
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// I/O error occurred.
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Kind of the underlying `std::io::Error`.
        kind: std::io::ErrorKind,
        /// Message of the underlying `std::io::Error`.
        message: String,
    },

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in text message.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Declared payload length does not fit in `usize`.
    #[error("Payload length {size} exceeds platform maximum {max}")]
    PayloadTooLargeForPlatform {
        /// Declared length.
        size: u64,
        /// Platform maximum.
        max: u64,
    },

    /// Invalid close code.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Invalid opcode value.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame fragmented.
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Server sent a masked frame.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Incomplete frame data.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },
}

impl Error {
    /// The lifecycle phase this error belongs to.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Error::InvalidUrl(_)
            | Error::UnsupportedScheme(_)
            | Error::Resolve { .. }
            | Error::Connect(_)
            | Error::Tls(_)
            | Error::InvalidHandshake(_)
            | Error::HandshakeRejected { .. }
            | Error::HandshakeTooLarge { .. }
            | Error::InvalidHeaderValue { .. } => Phase::Setup,
            _ => Phase::Steady,
        }
    }

    /// Returns `true` if the error happened before the session connected.
    #[must_use]
    pub const fn is_setup(&self) -> bool {
        matches!(self.phase(), Phase::Setup)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
