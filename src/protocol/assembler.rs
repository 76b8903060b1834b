//! Reassembly of fragmented messages and splitting of outgoing ones.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented data frames into complete messages.
///
/// Control frames may be interleaved between fragments; they are not
/// passed to the assembler.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            limits,
        }
    }

    /// Add a data frame. Returns the message once its final fragment arrives.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a control frame, a continuation with no
    ///   message in progress, or a new message started mid-assembly
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` on limit breaches
    /// - `Error::InvalidUtf8` if a text message is not valid UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match (frame.opcode, self.opcode) {
            (op, _) if op.is_control() => {
                return Err(Error::ProtocolViolation(format!(
                    "{op} frame passed to assembler"
                )));
            }
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (_, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (op, None) => self.opcode = Some(op),
        }

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take();
        self.fragment_count = 0;

        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Returns `true` while a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }
}

/// Splits an outgoing payload into frames of at most `fragment_size` bytes.
///
/// The first frame carries the message opcode, the rest are continuations.
/// An empty payload yields a single empty final frame.
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Create a fragmenter for `payload`.
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload,
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            started: false,
        }
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.started && self.offset >= self.payload.len() {
            return None;
        }
        let end = (self.offset + self.fragment_size).min(self.payload.len());
        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.opcode
        };
        let chunk = self.payload[self.offset..end].to_vec();
        self.offset = end;
        self.started = true;
        Some(Frame::new(end == self.payload.len(), opcode, chunk))
    }
}
