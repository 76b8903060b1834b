//! Host name resolution.
//!
//! The session resolves through the [`Resolve`] trait so callers can pin
//! hosts or substitute a resolver in tests.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};

/// Future returned by a resolver.
pub type Resolving = Pin<Box<dyn Future<Output = Result<Vec<SocketAddr>>> + Send>>;

/// Resolves a host and port into candidate endpoints, in preference order.
pub trait Resolve: Send + Sync {
    /// Look up `host` and pair every address with `port`.
    ///
    /// An empty result is an error, never `Ok(vec![])`.
    fn resolve(&self, host: &str, port: &str) -> Resolving;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, host: &str, port: &str) -> Resolving {
        (**self).resolve(host, port)
    }
}

fn resolve_error(host: &str, port: &str, reason: impl fmt::Display) -> Error {
    Error::Resolve {
        host: host.to_string(),
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_port(host: &str, port: &str) -> Result<u16> {
    port.parse::<u16>()
        .map_err(|_| resolve_error(host, port, "invalid port"))
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, port: &str) -> Resolving {
        let host = host.to_string();
        let port = port.to_string();
        Box::pin(async move {
            let port_num = parse_port(&host, &port)?;
            let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port_num))
                .await
                .map_err(|e| resolve_error(&host, &port, e))?
                .collect();
            if addrs.is_empty() {
                return Err(resolve_error(&host, &port, "no addresses found"));
            }
            trace!(%host, %port, count = addrs.len(), "resolved");
            Ok(addrs)
        })
    }
}

/// Resolver answering from a fixed table.
///
/// IP literals resolve to themselves; any other host must have an entry.
#[derive(Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the addresses for `host`.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, addrs: Vec<IpAddr>) -> Self {
        self.entries.insert(host.into().to_ascii_lowercase(), addrs);
        self
    }

    fn lookup(&self, host: &str, port: &str) -> Result<Vec<SocketAddr>> {
        let port_num = parse_port(host, port)?;
        let ips = match host.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => self
                .entries
                .get(&host.to_ascii_lowercase())
                .cloned()
                .unwrap_or_default(),
        };
        if ips.is_empty() {
            return Err(resolve_error(host, port, "no entry for host"));
        }
        Ok(ips
            .into_iter()
            .map(|ip| SocketAddr::new(ip, port_num))
            .collect())
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str, port: &str) -> Resolving {
        Box::pin(std::future::ready(self.lookup(host, port)))
    }
}

impl fmt::Debug for StaticResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticResolver")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
