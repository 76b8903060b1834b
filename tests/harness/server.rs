use std::future::Future;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use wsession::protocol::handshake::find_head_end;
use wsession::protocol::{Frame, HandshakeRequest, HandshakeResponse, OpCode};

pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Server side of one accepted connection.
pub struct ServerConn {
    io: Box<dyn Io>,
    buf: BytesMut,
}

impl ServerConn {
    fn new(io: Box<dyn Io>, buf: BytesMut) -> Self {
        Self { io, buf }
    }

    /// Write an unmasked frame.
    pub async fn send(&mut self, frame: Frame) {
        let mut out = Vec::new();
        frame.encode(&mut out, None);
        self.io.write_all(&out).await.unwrap();
        self.io.flush().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.io.write_all(bytes).await.unwrap();
        self.io.flush().await.unwrap();
    }

    /// Next frame from the client, `None` on EOF. Panics on an unmasked frame.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if let Ok((frame, used)) = Frame::parse(&self.buf) {
                assert!(self.buf[1] & 0x80 != 0, "client frame must be masked");
                let _ = self.buf.split_to(used);
                return Some(frame);
            }
            let n = self.io.read_buf(&mut self.buf).await.ok()?;
            if n == 0 {
                return None;
            }
        }
    }

    /// Next data frame, skipping control frames other than close.
    pub async fn recv_data(&mut self) -> Option<Frame> {
        loop {
            let frame = self.recv().await?;
            if !matches!(frame.opcode, OpCode::Ping | OpCode::Pong) {
                return Some(frame);
            }
        }
    }

    /// Send a close frame and wait for the client's echo.
    pub async fn close(&mut self, code: u16, reason: &str) -> Option<Frame> {
        self.send(Frame::close(Some(code), reason)).await;
        loop {
            let frame = self.recv().await?;
            if frame.opcode == OpCode::Close {
                return Some(frame);
            }
        }
    }

    /// Answer a close frame the client sent first.
    pub async fn await_close_and_echo(&mut self) -> Frame {
        loop {
            let frame = self.recv().await.expect("client went away before closing");
            if frame.opcode == OpCode::Close {
                self.send(Frame::close(Some(1000), "")).await;
                return frame;
            }
        }
    }

    /// Wait until the client closes the TCP connection.
    pub async fn drain(&mut self) {
        while self.recv().await.is_some() {}
    }
}

/// A single-connection server running on a background thread.
pub struct TestServer {
    addr: SocketAddr,
    thread: JoinHandle<Option<HandshakeRequest>>,
}

impl TestServer {
    /// Accept one client, complete the handshake, then run `script`.
    pub fn spawn<F, Fut>(script: F) -> Self
    where
        F: FnOnce(ServerConn) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Self::start(|io| async move { Some(Box::new(io) as Box<dyn Io>) }, Reply::Accept, script)
    }

    /// Like [`TestServer::spawn`], but answers the upgrade request with
    /// `reply` verbatim and then waits for the client to hang up.
    pub fn spawn_raw_reply(reply: Vec<u8>) -> Self {
        Self::start(
            |io| async move { Some(Box::new(io) as Box<dyn Io>) },
            Reply::Raw(reply),
            |mut conn| async move { conn.drain().await },
        )
    }

    /// Like [`TestServer::spawn`], but the socket is reset (linger zero)
    /// instead of closed gracefully once `script` drops the connection.
    pub fn spawn_resetting<F, Fut>(script: F) -> Self
    where
        F: FnOnce(ServerConn) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        Self::start(
            |io| async move {
                io.set_linger(Some(Duration::ZERO)).ok()?;
                Some(Box::new(io) as Box<dyn Io>)
            },
            Reply::Accept,
            script,
        )
    }

    /// Like [`TestServer::spawn`] behind a TLS acceptor.
    #[cfg(feature = "tls-rustls")]
    pub fn spawn_tls<F, Fut>(config: std::sync::Arc<rustls::ServerConfig>, script: F) -> Self
    where
        F: FnOnce(ServerConn) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let acceptor = tokio_rustls::TlsAcceptor::from(config);
        Self::start(
            move |io| async move {
                let tls = acceptor.accept(io).await.ok()?;
                Some(Box::new(tls) as Box<dyn Io>)
            },
            Reply::Accept,
            script,
        )
    }

    fn start<W, WFut, F, Fut>(wrap: W, reply: Reply, script: F) -> Self
    where
        W: FnOnce(tokio::net::TcpStream) -> WFut + Send + 'static,
        WFut: Future<Output = Option<Box<dyn Io>>> + Send,
        F: FnOnce(ServerConn) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();

                let (tcp, _) = listener.accept().await.ok()?;
                let mut io = wrap(tcp).await?;
                let (request, leftover) = read_request(&mut io).await?;

                let mut out = Vec::new();
                match reply {
                    Reply::Accept => HandshakeResponse::for_key(&request.key).write(&mut out),
                    Reply::Raw(bytes) => out = bytes,
                }
                io.write_all(&out).await.ok()?;
                io.flush().await.ok()?;

                script(ServerConn::new(io, leftover)).await;
                Some(request)
            })
        });
        let addr = rx.recv().unwrap();
        Self { addr, thread }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `ws://127.0.0.1:<port><path>`
    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Wait for the script to finish and return the upgrade request the
    /// client sent.
    pub fn finish(self) -> HandshakeRequest {
        self.thread
            .join()
            .expect("server thread panicked")
            .expect("no upgrade request received")
    }
}

enum Reply {
    Accept,
    Raw(Vec<u8>),
}

async fn read_request(io: &mut Box<dyn Io>) -> Option<(HandshakeRequest, BytesMut)> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = find_head_end(&buf) {
            let request = HandshakeRequest::parse(&buf[..end]).ok()?;
            let _ = buf.split_to(end);
            return Some((request, buf));
        }
        if io.read_buf(&mut buf).await.ok()? == 0 {
            return None;
        }
    }
}
