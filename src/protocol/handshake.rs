//! Client side of the WebSocket opening handshake (RFC 6455 Section 4).

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The GUID appended to the key when computing `Sec-WebSocket-Accept`.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes the `Sec-WebSocket-Accept` value for a `Sec-WebSocket-Key`.
///
/// # Example
///
/// ```
/// use wsession::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generates a fresh base64-encoded 16-byte `Sec-WebSocket-Key`.
///
/// # Errors
///
/// Returns `Error::InvalidHandshake` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::InvalidHandshake(format!("no randomness for key: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Position just past the blank line ending an HTTP head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

/// Parse header lines into a map keyed by lowercase name.
///
/// Repeated headers are joined with `", "`.
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        if let Some((name, value)) = line.split_once(':') {
            headers
                .entry(name.trim().to_ascii_lowercase())
                .and_modify(|v| {
                    v.push_str(", ");
                    v.push_str(value.trim());
                })
                .or_insert_with(|| value.trim().to_string());
        }
    }
    headers
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) || header.contains(['\r', '\n', ':']) {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR, LF or a colon in the name".to_string(),
        });
    }
    Ok(())
}

/// The upgrade request a client sends.
///
/// Extra headers added with [`HandshakeRequest::set_header`] are written
/// after the mandatory ones; this is the hook used to decorate the request
/// (for example with a `User-Agent`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request target (path and query).
    pub path: String,
    /// `Host` header value.
    pub host: String,
    /// `Sec-WebSocket-Key` header value.
    pub key: String,
    /// Additional headers in insertion order.
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    /// Build a request for `host` and `path` with a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns an error if no key could be generated.
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        Ok(Self::with_key(host, path, generate_key()?))
    }

    /// Build a request with a caller-chosen key.
    #[must_use]
    pub fn with_key(
        host: impl Into<String>,
        path: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "/".into() } else { path },
            host: host.into(),
            key: key.into(),
            headers: Vec::new(),
        }
    }

    /// Set an extra header, replacing an earlier value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    /// Value of an extra header, by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if any value contains CR or LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        validate_header_value("Host", &self.host)?;
        if self.path.contains(['\r', '\n', ' ']) {
            return Err(Error::InvalidHeaderValue {
                header: "request-target".to_string(),
                reason: "contains whitespace".to_string(),
            });
        }
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");
        for (name, value) in &self.headers {
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse an upgrade request, as a server would see it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the request line is not
    /// `GET <path> HTTP/1.1` or `Host` / `Sec-WebSocket-Key` are missing.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let path = match request_line.split_whitespace().collect::<Vec<_>>()[..] {
            ["GET", path, version] if version.starts_with("HTTP/1.1") => path.to_string(),
            _ => {
                return Err(Error::InvalidHandshake(format!(
                    "Invalid request line: {request_line}"
                )));
            }
        };

        let mut headers = parse_headers(lines);
        let host = headers
            .remove("host")
            .ok_or_else(|| Error::InvalidHandshake("Missing Host header".into()))?;
        let key = headers
            .remove("sec-websocket-key")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Key header".into()))?;

        let mut request = Self::with_key(host, path, key);
        for (name, value) in headers {
            request.headers.push((name, value));
        }
        Ok(request)
    }
}

/// The server's reply to an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// `Sec-WebSocket-Accept` value.
    pub accept: String,
    /// Selected subprotocol, if any.
    pub protocol: Option<String>,
    /// Negotiated extensions, if any.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Build the response a conforming server sends for `key`.
    #[must_use]
    pub fn for_key(key: &str) -> Self {
        Self {
            accept: compute_accept_key(key),
            protocol: None,
            extensions: Vec::new(),
        }
    }

    /// Serialize a `101 Switching Protocols` response.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        if let Some(proto) = &self.protocol {
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse the server's HTTP response head.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeRejected` if the status is not 101
    /// - `Error::InvalidHandshake` for a malformed status line or missing /
    ///   wrong `Upgrade`, `Connection` or `Sec-WebSocket-Accept` headers
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.split_whitespace();
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/1.") => {
                code.parse::<u16>().map_err(|_| {
                    Error::InvalidHandshake(format!("Invalid status line: {status_line}"))
                })?
            }
            _ => {
                return Err(Error::InvalidHandshake(format!(
                    "Invalid status line: {status_line}"
                )));
            }
        };
        if status != 101 {
            return Err(Error::HandshakeRejected { status });
        }

        let headers = parse_headers(lines);

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !connection.to_ascii_lowercase().contains("upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();

        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| e.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Ok(Self {
            accept,
            protocol: headers.get("sec-websocket-protocol").cloned(),
            extensions,
        })
    }

    /// Check the accept value against the key the client sent and reject
    /// extensions this client never offered.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept != compute_accept_key(key) {
            return Err(Error::InvalidHandshake(
                "Sec-WebSocket-Accept does not match key".into(),
            ));
        }
        if !self.extensions.is_empty() {
            return Err(Error::InvalidHandshake(format!(
                "Server negotiated unrequested extensions: {}",
                self.extensions.join(", ")
            )));
        }
        Ok(())
    }
}
