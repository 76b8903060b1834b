//! # wsession - blocking WebSocket client sessions
//!
//! `wsession` runs one client-side WebSocket connection (RFC 6455) over plain
//! TCP or TLS and exposes it through a small blocking API: a [`Session`] is
//! built for a `ws://` or `wss://` URL, a message handler is registered, and
//! [`Session::run`] blocks until the connection ends. Other threads may
//! [`send`](Session::send) and [`close`](Session::close) meanwhile.
//!
//! ## Quick Start
//!
//! ```no_run
//! use wsession::{Session, State};
//!
//! let session = Session::connect_to("wss://echo.example.com/")?;
//! session.on_state_change(|state| {
//!     if state == State::Connected {
//!         println!("connected");
//!     }
//! });
//! session.on_message(|msg| println!("received {msg:?}"));
//! let close = session.run()?;
//! println!("server closed with {close:?}");
//! # Ok::<(), wsession::Error>(())
//! ```
//!
//! ## Features
//!
//! - `tls-rustls` (default): `wss://` support through rustls, trusting the
//!   webpki root store unless a custom configuration is supplied

pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod stream;
pub mod tls;
pub mod transport;
pub mod url;

pub use config::{Config, DEFAULT_USER_AGENT, Limits};
pub use error::{Error, Phase, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use resolver::{Resolve, Resolving, StaticResolver, SystemResolver};
pub use session::{Session, State};
pub use stream::{ConnectionState, WebSocketStream};
pub use transport::{MaybeTlsStream, Scheme, Transport};
pub use crate::url::WsUrl;
