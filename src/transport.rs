//! Transport selection: plain TCP or TLS over TCP, picked from the URL
//! scheme.
//!
//! The session is written once against [`MaybeTlsStream`]; [`Transport`]
//! decides which variant gets built.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
#[cfg(feature = "tls-rustls")]
use crate::tls::{TlsConnector, client_config_with_webpki_roots};

/// Transport kind implied by a URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `ws` or `http`: plain TCP.
    Plain,
    /// `wss` or `https`: TLS over TCP.
    Secure,
}

impl Scheme {
    /// Map a URL scheme to a transport kind. Case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedScheme` for anything but `ws`, `wss`,
    /// `http` and `https`.
    pub fn parse(scheme: &str) -> Result<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "ws" | "http" => Ok(Scheme::Plain),
            "wss" | "https" => Ok(Scheme::Secure),
            _ => Err(Error::UnsupportedScheme(scheme.to_string())),
        }
    }

    /// Port used when the URL does not name one.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Plain => 80,
            Scheme::Secure => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Plain => write!(f, "ws"),
            Scheme::Secure => write!(f, "wss"),
        }
    }
}

/// How the session reaches the server.
#[derive(Clone, Debug)]
pub enum Transport {
    /// Plain TCP.
    Plain,
    /// TLS over TCP.
    #[cfg(feature = "tls-rustls")]
    Tls(TlsConnector),
}

impl Transport {
    /// Pick the transport for `scheme`.
    ///
    /// The TLS variant uses `config.tls_config` when set, otherwise the
    /// webpki root store.
    ///
    /// # Errors
    ///
    /// Returns `Error::Tls` for [`Scheme::Secure`] when built without the
    /// `tls-rustls` feature.
    pub fn select(scheme: Scheme, config: &Config) -> Result<Self> {
        match scheme {
            Scheme::Plain => Ok(Transport::Plain),
            #[cfg(feature = "tls-rustls")]
            Scheme::Secure => {
                let client_config = config
                    .tls_config
                    .clone()
                    .unwrap_or_else(client_config_with_webpki_roots);
                Ok(Transport::Tls(TlsConnector::new(client_config)))
            }
            #[cfg(not(feature = "tls-rustls"))]
            Scheme::Secure => {
                let _ = config;
                Err(Error::Tls("built without the tls-rustls feature".into()))
            }
        }
    }

    /// The scheme this transport serves.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        match self {
            Transport::Plain => Scheme::Plain,
            #[cfg(feature = "tls-rustls")]
            Transport::Tls(_) => Scheme::Secure,
        }
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.scheme() == Scheme::Secure
    }

    /// Connect to the first reachable endpoint in `addrs`, then run the TLS
    /// handshake against `host` for the secure variant.
    ///
    /// # Errors
    ///
    /// - `Error::Connect` with the last attempt's error if no endpoint accepts
    /// - `Error::Tls` if the TLS handshake fails
    pub async fn connect(&self, addrs: &[SocketAddr], host: &str) -> Result<MaybeTlsStream> {
        let tcp = connect_tcp(addrs).await?;
        match self {
            Transport::Plain => Ok(MaybeTlsStream::Plain(tcp)),
            #[cfg(feature = "tls-rustls")]
            Transport::Tls(connector) => {
                let tls = connector.connect(host, tcp).await?;
                Ok(MaybeTlsStream::Tls(Box::new(tls)))
            }
        }
    }
}

async fn connect_tcp(addrs: &[SocketAddr]) -> Result<TcpStream> {
    let mut last_err = None;
    for &addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    trace!(%addr, error = %e, "set_nodelay failed");
                }
                debug!(%addr, "TCP connected");
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(format!("{addr}: {e}"));
            }
        }
    }
    Err(Error::Connect(
        last_err.unwrap_or_else(|| "no endpoints to connect to".to_string()),
    ))
}

/// A connected byte stream, with or without TLS.
pub enum MaybeTlsStream {
    Plain(TcpStream),
    #[cfg(feature = "tls-rustls")]
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl MaybeTlsStream {
    /// Address of the connected peer.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            MaybeTlsStream::Plain(s) => s.peer_addr(),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }
}

impl fmt::Debug for MaybeTlsStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeTlsStream::Plain(s) => f.debug_tuple("Plain").field(s).finish(),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => f.debug_tuple("Tls").field(s.get_ref().0).finish(),
        }
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_flush(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(feature = "tls-rustls")]
            MaybeTlsStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
