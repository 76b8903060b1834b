//! TLS support for `wss://` connections.
//!
//! Backed by rustls (feature `tls-rustls`, enabled by default).

#[cfg(feature = "tls-rustls")]
mod rustls_impl;

#[cfg(feature = "tls-rustls")]
pub use rustls_impl::{TlsConnector, client_config_with_webpki_roots, load_certs_from_file};
