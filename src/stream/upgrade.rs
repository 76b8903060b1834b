//! Drives the opening handshake over a connected byte stream.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::handshake::find_head_end;
use crate::protocol::{HandshakeRequest, HandshakeResponse};

fn io_failure(stage: &str, err: std::io::Error) -> Error {
    Error::InvalidHandshake(format!("{stage}: {err}"))
}

/// Send `request` and read the server's response head.
///
/// Returns any bytes that arrived after the response head; they belong to
/// the first frames and must be fed to the frame reader.
///
/// # Errors
///
/// All failures are setup-phase errors: I/O problems and malformed
/// responses are `Error::InvalidHandshake`, a non-101 status is
/// `Error::HandshakeRejected`, and an oversized head is
/// `Error::HandshakeTooLarge`.
pub async fn client_handshake<S>(
    io: &mut S,
    request: &HandshakeRequest,
    limits: &Limits,
) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut out = Vec::with_capacity(256);
    request.write(&mut out)?;
    io.write_all(&out)
        .await
        .map_err(|e| io_failure("writing upgrade request", e))?;
    io.flush()
        .await
        .map_err(|e| io_failure("writing upgrade request", e))?;
    trace!(path = %request.path, host = %request.host, "upgrade request sent");

    let mut head = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&head) {
            limits.check_handshake_size(end)?;
            let response = HandshakeResponse::parse(&head[..end])?;
            response.verify(&request.key)?;
            debug!(protocol = ?response.protocol, "upgrade accepted");
            let _ = head.split_to(end);
            return Ok(head);
        }
        limits.check_handshake_size(head.len())?;

        let n = io
            .read_buf(&mut head)
            .await
            .map_err(|e| io_failure("reading upgrade response", e))?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    }
}
