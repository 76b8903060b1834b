use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader, MaskGenerator};

/// Reads server frames from the read half of a connection.
pub struct FrameReader<R> {
    io: R,
    read_buf: BytesMut,
    validator: FrameValidator,
}

impl<R> FrameReader<R> {
    #[must_use]
    pub fn new(io: R, config: &Config) -> Self {
        Self::with_buffered(io, config, BytesMut::new())
    }

    /// Start from bytes that were already read past the handshake response.
    #[must_use]
    pub fn with_buffered(io: R, config: &Config, mut buffered: BytesMut) -> Self {
        buffered.reserve(config.read_buffer_size);
        Self {
            io,
            read_buf: buffered,
            validator: FrameValidator::new(config.limits.clone()),
        }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next complete frame.
    ///
    /// The header is validated before the payload is buffered, so an
    /// oversized or masked frame fails as soon as its header arrives.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionClosed(None)` on EOF, an I/O error if the
    /// read fails, or a protocol error if the frame is invalid.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if self.read_buf.len() >= 2 {
                match FrameHeader::parse(&self.read_buf) {
                    Ok(header) => {
                        self.validator.validate_incoming(&header)?;
                        match Frame::parse(&self.read_buf) {
                            Ok((frame, consumed)) => {
                                let _ = self.read_buf.split_to(consumed);
                                frame.validate()?;
                                return Ok(frame);
                            }
                            Err(Error::IncompleteFrame { .. }) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    Err(Error::IncompleteFrame { .. }) => {}
                    Err(e) => return Err(e),
                }
            }

            self.read_buf.reserve(4096);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }
}

/// Writes masked client frames to the write half of a connection.
pub struct FrameWriter<W> {
    io: W,
    write_buf: BytesMut,
    masks: MaskGenerator,
}

impl<W> FrameWriter<W> {
    #[must_use]
    pub fn new(io: W, config: &Config) -> Self {
        Self {
            io,
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            masks: MaskGenerator::new(),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Mask and write one frame. Does not flush.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.masks.next_mask();
        self.write_buf.clear();
        self.write_buf.reserve(frame.wire_size(true));
        frame.encode(&mut self.write_buf, Some(mask));
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    /// Write a sequence of frames back to back, then flush.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if any write fails.
    pub async fn write_all_frames(&mut self, frames: impl IntoIterator<Item = Frame>) -> Result<()> {
        for frame in frames {
            self.write_frame(&frame).await?;
        }
        self.flush().await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Limits;
    use crate::protocol::OpCode;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct MockStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockStream {
        fn new(data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(data),
                write_data: Vec::new(),
            }
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let pos = self.read_data.position() as usize;
            let data = self.read_data.get_ref();
            if pos >= data.len() {
                return Poll::Ready(Ok(()));
            }
            // Hand out at most 3 bytes per read to exercise partial frames.
            let remaining = &data[pos..];
            let to_copy = remaining.len().min(buf.remaining()).min(3);
            buf.put_slice(&remaining[..to_copy]);
            self.read_data.set_position((pos + to_copy) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_unmasked_frames() {
        let data = vec![
            0x81, 0x05, b'H', b'e', b'l', b'l', b'o', // text "Hello"
            0x82, 0x03, 0x01, 0x02, 0x03, // binary
        ];
        let mut reader = FrameReader::new(MockStream::new(data), &Config::default());

        let first = reader.read_frame().await.unwrap();
        assert_eq!(first.opcode, OpCode::Text);
        assert_eq!(first.payload(), b"Hello");

        let second = reader.read_frame().await.unwrap();
        assert_eq!(second.payload(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_read_uses_buffered_bytes_first() {
        let leftover = BytesMut::from(&[0x89u8, 0x01, b'p'][..]);
        let mut reader =
            FrameReader::with_buffered(MockStream::new(vec![]), &Config::default(), leftover);
        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Ping);
        assert_eq!(frame.payload(), b"p");
        // Buffered bytes were consumed without touching the stream.
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::ConnectionClosed(None))
        ));
    }

    #[tokio::test]
    async fn test_read_large_payload() {
        let mut data = vec![0x82, 0x7E, 0x01, 0x2C];
        data.extend(std::iter::repeat_n(0xAB, 300));
        let mut reader = FrameReader::new(MockStream::new(data), &Config::default());

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.payload().len(), 300);
        assert!(frame.payload().iter().all(|&b| b == 0xAB));
    }

    #[tokio::test]
    async fn test_read_rejects_masked_frame() {
        let data = vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58];
        let mut reader = FrameReader::new(MockStream::new(data), &Config::default());
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::MaskedServerFrame)
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_oversized_frame_before_payload() {
        // Header announces 1000 bytes, none of which are sent.
        let data = vec![0x82, 0x7E, 0x03, 0xE8];
        let config = Config::default().with_limits(Limits::new(100, 1000, 4, 4096));
        let mut reader = FrameReader::new(MockStream::new(data), &config);
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::FrameTooLarge { size: 1000, max: 100 })
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_fragmented_ping() {
        let mut reader = FrameReader::new(MockStream::new(vec![0x09, 0x00]), &Config::default());
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::FragmentedControlFrame)
        ));
    }

    #[tokio::test]
    async fn test_read_connection_closed() {
        let mut reader = FrameReader::new(MockStream::new(vec![]), &Config::default());
        assert!(matches!(
            reader.read_frame().await,
            Err(Error::ConnectionClosed(None))
        ));
    }

    #[tokio::test]
    async fn test_write_frame_is_masked() {
        let mut writer = FrameWriter::new(MockStream::new(vec![]), &Config::default());
        writer.write_frame(&Frame::text("Hi")).await.unwrap();

        let written = &writer.io.write_data;
        assert_eq!(written[0], 0x81);
        assert_eq!(written[1], 0x82);
        assert_eq!(written.len(), 8);

        let (parsed, _) = Frame::parse(written).unwrap();
        assert_eq!(parsed.payload(), b"Hi");
    }

    #[tokio::test]
    async fn test_write_all_frames_uses_fresh_masks() {
        let mut writer = FrameWriter::new(MockStream::new(vec![]), &Config::default());
        writer
            .write_all_frames([Frame::binary(vec![0; 4]), Frame::binary(vec![0; 4])])
            .await
            .unwrap();

        let written = &writer.io.write_data;
        assert_eq!(written.len(), 20);
        assert_ne!(&written[2..6], &written[12..16]);
    }
}
