//! Blocking WebSocket stream over a split async byte stream.
//!
//! Every operation is a short future driven to completion with
//! [`Handle::block_on`], so callers must not be inside an async context.
//! The read half belongs to whichever thread drives [`WebSocketStream::read_message`];
//! all writes (data, pong replies, close frames) are serialized by one
//! mutex around the write half.

mod state;
mod upgrade;

pub use state::ConnectionState;
pub use upgrade::client_handshake;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{Frame, MessageAssembler, MessageFragmenter, OpCode};
use crate::transport::MaybeTlsStream;

/// Callback invoked for every control frame received, after the stream
/// has reacted to it (pong sent, close echoed).
pub type ControlHook = Box<dyn FnMut(OpCode, &[u8]) + Send>;

/// What a call to [`WebSocketStream::read_message`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete data message.
    Message(Message),
    /// The server's close frame; the close handshake is finished.
    Closed(Option<CloseFrame>),
}

struct ReadSide<S> {
    frames: FrameReader<ReadHalf<S>>,
    assembler: MessageAssembler,
    hook: Option<ControlHook>,
}

struct WriteSide<S> {
    frames: FrameWriter<WriteHalf<S>>,
    state: ConnectionState,
}

/// An open client connection after a successful opening handshake.
pub struct WebSocketStream<S = MaybeTlsStream> {
    handle: Handle,
    reader: Mutex<ReadSide<S>>,
    writer: Mutex<WriteSide<S>>,
    fragment_size: usize,
}

impl<S> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap a stream whose opening handshake already completed.
    ///
    /// `buffered` holds bytes read past the handshake response.
    pub fn from_parts(handle: Handle, io: S, buffered: BytesMut, config: &Config) -> Self {
        let (read_half, write_half) = tokio::io::split(io);
        Self {
            handle,
            reader: Mutex::new(ReadSide {
                frames: FrameReader::with_buffered(read_half, config, buffered),
                assembler: MessageAssembler::new(config.limits.clone()),
                hook: None,
            }),
            writer: Mutex::new(WriteSide {
                frames: FrameWriter::new(write_half, config),
                state: ConnectionState::Open,
            }),
            fragment_size: config.fragment_size,
        }
    }

    /// Install the control-frame hook, replacing any previous one.
    pub fn set_control_hook(&self, hook: ControlHook) {
        self.reader.lock().hook = Some(hook);
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.writer.lock().state
    }

    /// `true` until a close frame has been sent or received, or the server
    /// broke the protocol.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Block until a complete data message or the server's close frame
    /// arrives.
    ///
    /// Pings are answered with a pong carrying the same payload. A close
    /// frame from the server is echoed (if we had not sent one already)
    /// before this returns [`Incoming::Closed`].
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` once the close handshake finished
    /// - I/O failures, left to surface again on the next write
    /// - EOF without a close frame and protocol violations, after which
    ///   the stream is marked closed
    /// - a malformed close frame, after it has been answered with 1002 or
    ///   1007
    pub fn read_message(&self) -> Result<Incoming> {
        if !self.state().can_receive() {
            return Err(Error::ConnectionClosed(None));
        }
        let mut guard = self.reader.lock();
        let ReadSide {
            frames,
            assembler,
            hook,
        } = &mut *guard;

        loop {
            let frame = match self.handle.block_on(frames.read_frame()) {
                Ok(frame) => frame,
                Err(e) => {
                    if !matches!(e, Error::Io { .. }) {
                        self.writer.lock().state = ConnectionState::Closed;
                    }
                    return Err(e);
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    trace!(len = frame.payload().len(), "ping received");
                    self.reply_pong(frame.payload())?;
                    if let Some(hook) = hook.as_mut() {
                        hook(OpCode::Ping, frame.payload());
                    }
                }
                OpCode::Pong => {
                    trace!(len = frame.payload().len(), "pong received");
                    if let Some(hook) = hook.as_mut() {
                        hook(OpCode::Pong, frame.payload());
                    }
                }
                OpCode::Close => {
                    let close = CloseFrame::from_payload(frame.payload());
                    let echo = match &close {
                        Ok(Some(cf)) => Frame::close(Some(cf.code.as_u16()), &cf.reason),
                        Ok(None) => Frame::close(None, ""),
                        Err(Error::InvalidUtf8) => {
                            Frame::close(Some(CloseCode::InvalidPayload.as_u16()), "")
                        }
                        Err(_) => Frame::close(Some(CloseCode::ProtocolError.as_u16()), ""),
                    };
                    self.finish_close(echo);
                    if let Some(hook) = hook.as_mut() {
                        hook(OpCode::Close, frame.payload());
                    }
                    return close.map(Incoming::Closed);
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    match assembler.push(frame) {
                        Ok(Some(message)) => {
                            trace!(len = message.len(), "message received");
                            return Ok(Incoming::Message(message));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            self.writer.lock().state = ConnectionState::Closed;
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Send one data message, fragmented by the configured fragment size.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` once a close frame was sent or received;
    /// otherwise the I/O error from the write.
    pub fn send(&self, message: &Message) -> Result<()> {
        let opcode = if message.is_text() {
            OpCode::Text
        } else {
            OpCode::Binary
        };

        let mut guard = self.writer.lock();
        let side = &mut *guard;
        if !side.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        let frames = MessageFragmenter::new(message.payload(), opcode, self.fragment_size);
        self.handle.block_on(side.frames.write_all_frames(frames))?;
        trace!(len = message.len(), "message sent");
        Ok(())
    }

    /// Start the close handshake.
    ///
    /// Returns `Ok(true)` if a close frame was sent, `Ok(false)` if the
    /// stream was not open.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for codes that must not appear on the wire,
    /// or the I/O error from the write.
    pub fn close(&self, code: CloseCode, reason: &str) -> Result<bool> {
        if code.is_reserved() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }

        let mut guard = self.writer.lock();
        let side = &mut *guard;
        if side.state != ConnectionState::Open {
            return Ok(false);
        }
        side.state = ConnectionState::Closing;
        let frame = Frame::close(Some(code.as_u16()), reason);
        self.handle.block_on(side.frames.write_all_frames([frame]))?;
        debug!(code = code.as_u16(), "close frame sent");
        Ok(true)
    }

    fn reply_pong(&self, payload: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock();
        let side = &mut *guard;
        if !side.state.can_send() {
            return Ok(());
        }
        let pong = Frame::pong(payload.to_vec());
        self.handle.block_on(side.frames.write_all_frames([pong]))
    }

    fn finish_close(&self, echo: Frame) {
        let mut guard = self.writer.lock();
        let side = &mut *guard;

        if side.state == ConnectionState::Open {
            if let Err(e) = self.handle.block_on(side.frames.write_all_frames([echo])) {
                debug!(error = %e, "failed to echo close frame");
            }
        }

        side.state = ConnectionState::Closed;
        if let Err(e) = self.handle.block_on(side.frames.shutdown()) {
            trace!(error = %e, "shutdown after close failed");
        }
        debug!(state = %side.state, "close handshake complete");
    }
}
