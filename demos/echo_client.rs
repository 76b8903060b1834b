//! Blocking echo client.
//!
//! Run with: cargo run --example echo_client -- wss://echo.websocket.org/
//!
//! Connects, sends a few lines once the session reports `Connected`,
//! prints every echoed message and closes after the last reply.
//! Set `RUST_LOG=wsession=debug` to watch the session lifecycle.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wsession::{Message, Session, State};

const DEFAULT_URL: &str = "wss://echo.websocket.org/";
const LINES: [&str; 3] = ["hello", "from", "wsession"];

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_URL.to_string());
    println!("Connecting to {url}");

    let session = Arc::new(Session::connect_to(&url)?);

    let weak = Arc::downgrade(&session);
    session.on_state_change(move |state| {
        println!("state: {state}");
        if state != State::Connected {
            return;
        }
        let Some(session) = weak.upgrade() else { return };
        for line in LINES {
            if let Err(e) = session.send(line) {
                eprintln!("send failed: {e}");
            }
        }
    });

    let received = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&session);
    session.on_message(move |msg| {
        match msg {
            Message::Text(text) => println!("< {text}"),
            Message::Binary(data) => println!("< {} bytes", data.len()),
        }
        // Some echo servers greet first, so count only our own lines.
        if msg.as_text().is_some_and(|t| LINES.contains(&t))
            && received.fetch_add(1, Ordering::SeqCst) + 1 == LINES.len()
        {
            if let Some(session) = weak.upgrade() {
                let _ = session.close();
            }
        }
    });

    match session.run()? {
        Some(close) => println!("closed: {:?} {}", close.code, close.reason),
        None => println!("closed without status"),
    }
    Ok(())
}
