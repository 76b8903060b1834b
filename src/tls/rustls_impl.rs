use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::ClientConfig;
use tracing::debug;

use crate::error::{Error, Result};

/// Client configuration trusting the Mozilla root store shipped in
/// `webpki-roots`.
#[must_use]
pub fn client_config_with_webpki_roots() -> Arc<ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
}

/// Performs the client side of the TLS handshake over a connected socket.
#[derive(Clone)]
pub struct TlsConnector {
    inner: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            inner: tokio_rustls::TlsConnector::from(config),
        }
    }

    /// Run the TLS handshake, verifying the certificate against `domain`.
    ///
    /// `domain` may be a DNS name or an IP literal.
    pub async fn connect(&self, domain: &str, stream: TcpStream) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| Error::Tls(format!("invalid server name: {domain}")))?;

        let tls_stream = self
            .inner
            .connect(server_name, stream)
            .await
            .map_err(|e| Error::Tls(e.to_string()))?;

        debug!(%domain, "TLS handshake complete");
        Ok(tls_stream)
    }
}

impl fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

/// Read every PEM certificate in `path`.
///
/// # Errors
///
/// Returns `Error::Tls` if the file cannot be read or holds no certificates.
pub fn load_certs_from_file(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| Error::Tls(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("cannot parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}
