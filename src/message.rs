//! WebSocket messages and close codes.

/// WebSocket close status code per RFC 6455 Section 7.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid payload (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Mandatory extension (1010).
    MandatoryExtension,
    /// Internal error (1011).
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    /// Create a `CloseCode` from its numeric value.
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1010 => CloseCode::MandatoryExtension,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    /// Numeric value of this close code.
    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::MandatoryExtension => 1010,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }

    /// Codes 1004-1006 and 1015 must never appear in a close frame.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

/// Status code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: CloseCode,
    /// Human-readable reason (UTF-8, at most 123 bytes on the wire).
    pub reason: String,
}

impl CloseFrame {
    /// Create a new close frame with the given code and reason.
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close frame payload.
    ///
    /// An empty payload carries no status and yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a one-byte payload
    /// - `Error::InvalidCloseCode` for codes below 1000, at or above 5000,
    ///   or reserved for local use (1004-1006, 1015)
    /// - `Error::InvalidUtf8` if the reason is not UTF-8
    pub fn from_payload(payload: &[u8]) -> Result<Option<Self>, crate::Error> {
        match payload {
            [] => Ok(None),
            [_] => Err(crate::Error::ProtocolViolation(
                "Close frame payload of one byte".into(),
            )),
            [hi, lo, reason @ ..] => {
                let raw = u16::from_be_bytes([*hi, *lo]);
                let code = CloseCode::from_u16(raw);
                if !(1000..5000).contains(&raw) || code.is_reserved() {
                    return Err(crate::Error::InvalidCloseCode(raw));
                }
                let reason = std::str::from_utf8(reason)?;
                Ok(Some(Self::new(code, reason)))
            }
        }
    }
}

/// A complete data message delivered to or sent from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8).
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
}

impl Message {
    /// Create a text message.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    /// Create a binary message.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    /// Returns `true` if this is a text message.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Returns `true` if this is a binary message.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    /// Payload bytes, regardless of message type.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload().len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            Message::Binary(_) => None,
        }
    }

    /// Consume and return the raw payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(data) => data,
        }
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(s.to_owned())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}

impl From<&[u8]> for Message {
    fn from(data: &[u8]) -> Self {
        Message::Binary(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(CloseCode::from_u16(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from_u16(1011), CloseCode::InternalError);
        assert_eq!(CloseCode::from_u16(4000), CloseCode::Other(4000));
        assert_eq!(CloseCode::Other(4000).as_u16(), 4000);
        assert_eq!(CloseCode::default(), CloseCode::Normal);
    }

    #[test]
    fn test_close_code_reserved() {
        assert!(CloseCode::from_u16(1005).is_reserved());
        assert!(CloseCode::from_u16(1015).is_reserved());
        assert!(!CloseCode::Normal.is_reserved());
    }

    #[test]
    fn test_close_frame_from_payload() {
        assert_eq!(CloseFrame::from_payload(&[]), Ok(None));

        let cf = CloseFrame::from_payload(&[0x03, 0xe8, b'b', b'y', b'e'])
            .unwrap()
            .unwrap();
        assert_eq!(cf.code, CloseCode::Normal);
        assert_eq!(cf.reason, "bye");

        let cf = CloseFrame::from_payload(&[0x0f, 0xa0]).unwrap().unwrap();
        assert_eq!(cf.code, CloseCode::Other(4000));
    }

    #[test]
    fn test_malformed_close_payloads_rejected() {
        assert!(matches!(
            CloseFrame::from_payload(&[0x03]),
            Err(crate::Error::ProtocolViolation(_))
        ));
        assert_eq!(
            CloseFrame::from_payload(&[0x03, 0xe8, 0xff, 0xfe]),
            Err(crate::Error::InvalidUtf8)
        );
        for code in [999u16, 1005, 1006, 1015, 5000] {
            assert_eq!(
                CloseFrame::from_payload(&code.to_be_bytes()),
                Err(crate::Error::InvalidCloseCode(code))
            );
        }
    }

    #[test]
    fn test_message_conversions() {
        let m: Message = "ping".into();
        assert!(m.is_text());
        assert_eq!(m.as_text(), Some("ping"));
        assert_eq!(m.len(), 4);

        let m: Message = vec![1u8, 2, 3].into();
        assert!(m.is_binary());
        assert_eq!(m.payload(), &[1, 2, 3]);
        assert_eq!(m.into_payload(), vec![1, 2, 3]);

        assert!(Message::text("").is_empty());
    }
}
