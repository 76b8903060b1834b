//! The client session: one connection, its lifecycle, and the blocking API
//! around it.
//!
//! ```text
//!   Unknown --setup ok--> Connected --server close--> Closed
//!      |                      |                         ^
//!      +--setup failed        +--------close()----------+
//!         (stays Unknown, observer notified)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{HandshakeRequest, OpCode};
use crate::resolver::{Resolve, SystemResolver};
use crate::stream::{Incoming, WebSocketStream, client_handshake};
use crate::transport::Transport;
use crate::url::WsUrl;

/// Session lifecycle as seen by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Not connected yet, or setup failed.
    #[default]
    Unknown,
    /// The opening handshake completed.
    Connected,
    /// A close frame was sent or received.
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Unknown => write!(f, "Unknown"),
            State::Connected => write!(f, "Connected"),
            State::Closed => write!(f, "Closed"),
        }
    }
}

type Observer = Arc<dyn Fn(State) + Send + Sync>;
type Handler = Arc<Mutex<Box<dyn FnMut(&mut Message) + Send>>>;

/// State shared with the control-frame hook installed on the stream.
struct Shared {
    state: Mutex<State>,
    observer: RwLock<Observer>,
}

impl Shared {
    fn notify(&self, state: State) {
        let observer = self.observer.read().clone();
        observer(state);
    }

    fn transition(&self, to: State) {
        *self.state.lock() = to;
        debug!(state = %to, "session state changed");
        self.notify(to);
    }

    /// Move from `Unknown` to `Connected`. A `close()` that raced ahead of
    /// this already recorded `Closed`, which then stands.
    fn connect(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != State::Unknown {
                return false;
            }
            *state = State::Connected;
        }
        debug!(state = %State::Connected, "session state changed");
        self.notify(State::Connected);
        true
    }

    /// Move to `Closed` unless already there. Returns whether it moved.
    fn mark_closed(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == State::Closed {
                return false;
            }
            *state = State::Closed;
        }
        debug!(state = %State::Closed, "session state changed");
        self.notify(State::Closed);
        true
    }
}

/// A blocking client session for one WebSocket connection.
///
/// [`run`](Session::run) blocks the calling thread for the life of the
/// connection and hands every received message to the handler registered
/// with [`on_message`](Session::on_message). Other threads may call
/// [`send`](Session::send) and [`close`](Session::close) on the same
/// session through an `Arc`.
///
/// Handlers and observers run on the thread that triggered them and outside
/// any async context, so they may call back into the session.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wsession::Session;
///
/// let session = Arc::new(Session::connect_to("ws://127.0.0.1:9001/echo")?);
/// session.on_message(|msg| println!("received {msg:?}"));
///
/// let runner = Arc::clone(&session);
/// let worker = std::thread::spawn(move || runner.run());
/// session.send("hello")?;
/// session.close()?;
/// worker.join().expect("run thread panicked")?;
/// # Ok::<(), wsession::Error>(())
/// ```
pub struct Session {
    url: WsUrl,
    resolver: Arc<dyn Resolve>,
    transport: Transport,
    config: Config,
    shared: Arc<Shared>,
    stream: OnceLock<WebSocketStream>,
    handler: Mutex<Option<Handler>>,
    ran: AtomicBool,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl Session {
    /// Create an unconnected session with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the internal runtime cannot be started.
    pub fn new(resolver: Arc<dyn Resolve>, transport: Transport, url: WsUrl) -> Result<Self> {
        Self::with_config(resolver, transport, url, Config::default())
    }

    /// Create an unconnected session.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the internal runtime cannot be started.
    pub fn with_config(
        resolver: Arc<dyn Resolve>,
        transport: Transport,
        url: WsUrl,
        config: Config,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wsession-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let noop: Observer = Arc::new(|_| {});

        Ok(Self {
            url,
            resolver,
            transport,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(State::Unknown),
                observer: RwLock::new(noop),
            }),
            stream: OnceLock::new(),
            handler: Mutex::new(None),
            ran: AtomicBool::new(false),
            handle,
            runtime: Some(runtime),
        })
    }

    /// Parse `url`, pick the transport from its scheme, and resolve through
    /// the operating system.
    ///
    /// # Errors
    ///
    /// URL and scheme errors, TLS configuration errors, or a runtime
    /// startup failure.
    pub fn connect_to(url: &str) -> Result<Self> {
        let url = WsUrl::parse(url)?;
        let config = Config::default();
        let transport = Transport::select(url.scheme(), &config)?;
        Self::with_config(Arc::new(SystemResolver::new()), transport, url, config)
    }

    /// Connect to the URL's path and process messages until the connection
    /// ends. See [`run_with_path`](Session::run_with_path).
    ///
    /// # Errors
    ///
    /// See [`run_with_path`](Session::run_with_path).
    pub fn run(&self) -> Result<Option<CloseFrame>> {
        let path = self.url.path();
        self.run_with_path(&path)
    }

    /// Resolve, connect, complete the TLS and WebSocket handshakes, then
    /// deliver messages to the handler until the connection ends.
    ///
    /// Returns the server's close frame once the close handshake completes
    /// (`None` if it carried no status).
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyRun` if `run` was called before
    /// - a setup-phase error (state stays `Unknown`, observer notified)
    /// - a steady-state error when a read fails (state unchanged)
    pub fn run_with_path(&self, path: &str) -> Result<Option<CloseFrame>> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRun);
        }

        let stream = match self.setup(path) {
            Ok(stream) => self.stream.get_or_init(|| stream),
            Err(e) => {
                warn!(url = %self.url, error = %e, "session setup failed");
                self.shared.transition(State::Unknown);
                return Err(e);
            }
        };

        let shared = Arc::clone(&self.shared);
        stream.set_control_hook(Box::new(move |opcode, _payload| {
            if opcode == OpCode::Close {
                shared.mark_closed();
            }
        }));
        if !self.shared.connect() {
            trace!("closed before the connected state was recorded");
        }

        loop {
            match stream.read_message() {
                Ok(Incoming::Message(mut message)) => self.dispatch(&mut message),
                Ok(Incoming::Closed(frame)) => {
                    debug!(url = %self.url, "session finished");
                    return Ok(frame);
                }
                Err(e) => {
                    debug!(url = %self.url, error = %e, "read loop ended");
                    return Err(e);
                }
            }
        }
    }

    fn setup(&self, path: &str) -> Result<WebSocketStream> {
        let host = self.url.host().to_string();
        let port = self.url.port_str().to_string();

        let mut request = HandshakeRequest::new(self.url.host_header(), path)?;
        request.set_header("User-Agent", self.config.user_agent.clone());

        let (io, buffered) = self.handle.block_on(async {
            let addrs = self.resolver.resolve(&host, &port).await?;
            debug!(%host, %port, candidates = addrs.len(), "resolved");

            let mut io = self.transport.connect(&addrs, &host).await?;
            let buffered = client_handshake(&mut io, &request, &self.config.limits).await?;
            Ok::<_, Error>((io, buffered))
        })?;

        debug!(%host, %port, secure = self.transport.is_secure(), "connected");
        Ok(WebSocketStream::from_parts(
            self.handle.clone(),
            io,
            buffered,
            &self.config,
        ))
    }

    fn dispatch(&self, message: &mut Message) {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                let mut call = handler.lock();
                (*call)(message);
            }
            None => trace!(len = message.len(), "no handler, message discarded"),
        }
    }

    /// Send one text or binary message.
    ///
    /// Never changes the session state.
    ///
    /// # Errors
    ///
    /// `Error::ConnectionClosed` before setup completes or once the close
    /// handshake started; otherwise the transport's write error.
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        match self.stream.get() {
            Some(stream) => stream.send(&message.into()),
            None => Err(Error::ConnectionClosed(None)),
        }
    }

    /// Send a normal-closure close frame if the connection is open, and mark
    /// the session `Closed`.
    ///
    /// A session that never connected, or whose close handshake already
    /// started, is left untouched.
    ///
    /// # Errors
    ///
    /// The transport's write error.
    pub fn close(&self) -> Result<()> {
        let Some(stream) = self.stream.get() else {
            return Ok(());
        };
        if stream.close(CloseCode::Normal, "")? {
            self.shared.mark_closed();
        }
        Ok(())
    }

    /// Register the message handler, replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: FnMut(&mut Message) + Send + 'static,
    {
        *self.handler.lock() = Some(Arc::new(Mutex::new(Box::new(handler))));
    }

    /// Register the state-change observer, replacing any previous one.
    pub fn on_state_change<F>(&self, observer: F)
    where
        F: Fn(State) + Send + Sync + 'static,
    {
        *self.shared.observer.write() = Arc::new(observer);
    }

    /// Last recorded state. The connection itself is not consulted.
    #[must_use]
    pub fn current_state(&self) -> State {
        *self.shared.state.lock()
    }

    /// Target this session connects to.
    #[must_use]
    pub fn url(&self) -> &WsUrl {
        &self.url
    }

    /// Transport picked at construction.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Configuration the session was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url.to_string())
            .field("transport", &self.transport.scheme())
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if Handle::try_current().is_ok() {
            trace!("session dropped inside a runtime, skipping close");
        } else if let Err(e) = self.close() {
            trace!(error = %e, "close on drop failed");
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
