//! Loopback WebSocket server for session tests.
//!
//! Each [`TestServer`] accepts exactly one connection on 127.0.0.1, answers
//! the opening handshake and then runs a per-test script against a
//! [`ServerConn`]. The server lives on its own runtime thread because the
//! session under test blocks the calling thread.

#![allow(dead_code)]

mod server;

pub use server::{ServerConn, TestServer};

use std::net::SocketAddr;

/// An address on which nothing is listening.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Install a fmt subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
