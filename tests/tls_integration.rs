#![cfg(feature = "tls-rustls")]

mod harness;

use std::io::Write as _;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use harness::{TestServer, init_tracing};
use parking_lot::Mutex;
use rcgen::{CertifiedKey, generate_simple_self_signed};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use wsession::protocol::Frame;
use wsession::tls::TlsConnector;
use wsession::{
    CloseCode, Config, Error, Scheme, Session, State, StaticResolver, Transport, WsUrl,
};

fn generate_test_cert() -> (CertifiedKey, Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let certified = generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = CertificateDer::from(certified.cert.der().to_vec());
    let key_der = PrivateKeyDer::Pkcs8(certified.key_pair.serialize_der().into());
    (certified, vec![cert_der], key_der)
}

fn create_test_server_config(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Arc<ServerConfig> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    Arc::new(config)
}

fn create_test_client_config(server_cert: CertificateDer<'static>) -> Arc<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.add(server_cert).unwrap();

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Arc::new(config)
}

/// A `wss://localhost` session whose resolver maps `localhost` to loopback.
fn secure_session(server: &TestServer, path: &str, config: Config) -> Session {
    init_tracing();
    let url = WsUrl::parse(&format!("wss://localhost:{}{path}", server.addr().port())).unwrap();
    assert_eq!(url.scheme(), Scheme::Secure);
    let transport = Transport::select(url.scheme(), &config).unwrap();
    let resolver =
        StaticResolver::new().with_host("localhost", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    Session::with_config(Arc::new(resolver), transport, url, config).unwrap()
}

#[tokio::test]
async fn test_connector_completes_tls_handshake() {
    let (_, certs, key) = generate_test_cert();
    let server_config = create_test_server_config(certs.clone(), key);
    let client_config = create_test_client_config(certs[0].clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let acceptor = tokio_rustls::TlsAcceptor::from(server_config);
        let (stream, _) = listener.accept().await.unwrap();
        let mut tls_stream = acceptor.accept(stream).await.unwrap();

        let mut buf = [0u8; 5];
        tls_stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        tls_stream.write_all(b"world").await.unwrap();
    });

    let connector = TlsConnector::new(client_config);
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut tls_stream = connector.connect("localhost", stream).await.unwrap();

    tls_stream.write_all(b"hello").await.unwrap();
    let mut buf = [0u8; 5];
    tls_stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"world");

    server_handle.await.unwrap();
}

#[tokio::test]
async fn test_connector_rejects_wrong_server_name() {
    let (_, certs, key) = generate_test_cert();
    let server_config = create_test_server_config(certs.clone(), key);
    let client_config = create_test_client_config(certs[0].clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let acceptor = tokio_rustls::TlsAcceptor::from(server_config);
        let (stream, _) = listener.accept().await.unwrap();
        let _ = acceptor.accept(stream).await;
    });

    let connector = TlsConnector::new(client_config);
    let stream = TcpStream::connect(addr).await.unwrap();
    let result = connector.connect("not-localhost.test", stream).await;
    assert!(matches!(result, Err(Error::Tls(_))));
}

#[test]
fn test_secure_session_exchanges_messages() {
    let (_, certs, key) = generate_test_cert();
    let server = TestServer::spawn_tls(create_test_server_config(certs.clone(), key), |mut conn| {
        async move {
            let greeting = conn.recv_data().await.expect("no greeting");
            conn.send(Frame::text(greeting.into_payload())).await;
            conn.close(1000, "secure bye").await;
        }
    });

    let config = Config::default().with_tls_config(create_test_client_config(certs[0].clone()));
    let session = Arc::new(secure_session(&server, "/secure", config));
    assert!(session.transport().is_secure());

    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    session.on_message(move |msg| sink.lock().push(msg.clone()));

    let weak = Arc::downgrade(&session);
    session.on_state_change(move |state| {
        if state == State::Connected {
            if let Some(session) = weak.upgrade() {
                session.send("over tls").unwrap();
            }
        }
    });

    let close = session.run().unwrap();
    assert_eq!(close.map(|c| (c.code, c.reason)), Some((CloseCode::Normal, "secure bye".into())));
    assert_eq!(*messages.lock(), vec![wsession::Message::text("over tls")]);
    assert_eq!(session.current_state(), State::Closed);

    let request = server.finish();
    assert_eq!(request.path, "/secure");
    assert_eq!(request.host, format!("localhost:{}", session.url().port_str()));
}

#[test]
fn test_root_certificates_from_pem_file() {
    let (certified, certs, key) = generate_test_cert();
    let server = TestServer::spawn_tls(create_test_server_config(certs, key), |mut conn| {
        async move {
            conn.close(1000, "").await;
        }
    });

    let mut pem = tempfile::NamedTempFile::new().unwrap();
    pem.write_all(certified.cert.pem().as_bytes()).unwrap();
    let config = Config::default().with_root_certificates(pem.path()).unwrap();

    let session = secure_session(&server, "/", config);
    assert!(session.run().unwrap().is_some());
    server.finish();
}

#[test]
fn test_untrusted_certificate_is_setup_error() {
    let (_, certs, key) = generate_test_cert();
    let (_, other_certs, _) = generate_test_cert();
    let server = TestServer::spawn_tls(create_test_server_config(certs, key), |_conn| async {});

    let config = Config::default().with_tls_config(create_test_client_config(other_certs[0].clone()));
    let session = secure_session(&server, "/", config);

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    session.on_state_change(move |state| sink.lock().push(state));

    let err = session.run().unwrap_err();
    assert!(matches!(err, Error::Tls(_)), "got {err:?}");
    assert!(err.is_setup());
    assert_eq!(*states.lock(), vec![State::Unknown]);
}

#[test]
fn test_webpki_roots_are_the_default() {
    let url = WsUrl::parse("wss://example.com/").unwrap();
    let transport = Transport::select(url.scheme(), &Config::default()).unwrap();
    assert!(transport.is_secure());
    assert_eq!(transport.scheme(), Scheme::Secure);
}
