//! Parsed WebSocket target URLs.

use std::fmt;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::Scheme;

/// A validated `ws`, `wss`, `http` or `https` URL.
///
/// The port is kept as a string, defaulted from the scheme when the URL
/// does not name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    inner: Url,
    scheme: Scheme,
    host: String,
    port: String,
}

impl WsUrl {
    /// Parse and validate a target URL.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the string is not a URL or has no host
    /// - `Error::UnsupportedScheme` for any scheme other than the four above
    pub fn parse(input: &str) -> Result<Self> {
        let inner = Url::parse(input)?;
        let scheme = Scheme::parse(inner.scheme())?;
        let host = match inner.host() {
            Some(url::Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(Error::InvalidUrl(format!("missing host in {input}"))),
        };
        let port = inner
            .port()
            .unwrap_or_else(|| scheme.default_port())
            .to_string();
        Ok(Self {
            inner,
            scheme,
            host,
            port,
        })
    }

    /// Transport kind implied by the scheme.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name or IP literal, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port as a string.
    #[must_use]
    pub fn port_str(&self) -> &str {
        &self.port
    }

    /// Request target: path plus query, `/` when the URL has no path.
    #[must_use]
    pub fn path(&self) -> String {
        let path = match self.inner.path() {
            "" => "/",
            p => p,
        };
        match self.inner.query() {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        }
    }

    /// Value for the `Host` header. The port is omitted when it is the
    /// scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = match self.inner.host() {
            Some(url::Host::Ipv6(addr)) => format!("[{addr}]"),
            _ => self.host.clone(),
        };
        match self.inner.port() {
            Some(port) if port != self.scheme.default_port() => format!("{host}:{port}"),
            _ => host,
        }
    }

    /// The underlying parsed URL.
    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.inner
    }
}

impl fmt::Display for WsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl std::str::FromStr for WsUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
