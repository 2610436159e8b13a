//! The accept loop end to end: TLS, one request per connection, shutdown and
//! drain.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mercury::{Identity, Router, Server, ShutdownHandle};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

const CA: &[u8] = include_bytes!("fixtures/ca.pem");
const SERVER_CERT: &[u8] = include_bytes!("fixtures/server.pem");
const SERVER_KEY: &[u8] = include_bytes!("fixtures/server.key");
const CLIENT_CERT: &[u8] = include_bytes!("fixtures/client.pem");
const CLIENT_KEY: &[u8] = include_bytes!("fixtures/client.key");

fn certs(pem: &[u8]) -> Vec<CertificateDer<'static>> {
    rustls_pemfile::certs(&mut &pem[..]).collect::<Result<_, _>>().unwrap()
}

fn key(pem: &[u8]) -> PrivateKeyDer<'static> {
    rustls_pemfile::private_key(&mut &pem[..]).unwrap().unwrap()
}

async fn start(router: Router) -> (SocketAddr, ShutdownHandle, JoinHandle<Result<(), mercury::Error>>) {
    let server = Server::builder()
        .identity(Identity::from_pem(SERVER_CERT, SERVER_KEY).unwrap())
        .startup_message(false)
        .read_timeout(Duration::from_secs(5))
        .write_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let shutdown = server.shutdown_handle();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(server.serve_on(listener, router, std::future::pending()));
    (addr, shutdown, task)
}

fn connector(with_client_cert: bool) -> TlsConnector {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = RootCertStore::empty();
    for cert in certs(CA) {
        roots.add(cert).unwrap();
    }
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots);
    let config = if with_client_cert {
        builder.with_client_auth_cert(certs(CLIENT_CERT), key(CLIENT_KEY)).unwrap()
    } else {
        builder.with_no_client_auth()
    };
    TlsConnector::from(Arc::new(config))
}

async fn fetch(addr: SocketAddr, connector: &TlsConnector, request: &str) -> Vec<u8> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let domain = ServerName::try_from("localhost").unwrap();
    let mut tls = connector.connect(domain, tcp).await.unwrap();

    tls.write_all(request.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tls.read_to_end(&mut out).await.unwrap();
    out
}

fn cert_router() -> Router {
    Router::new().on("/whoami", |ctx| {
        let count = ctx.client_certificates().len();
        ctx.set_body(format!("{count} certificate(s)"));
        Ok(())
    })
}

#[tokio::test]
async fn serves_over_tls_and_stops_on_shutdown() {
    let (addr, shutdown, task) = start(cert_router()).await;

    let out = fetch(addr, &connector(false), "gemini://localhost/whoami\r\n").await;
    assert_eq!(out, b"20 text/plain\r\n0 certificate(s)".to_vec());

    let out = fetch(addr, &connector(false), "gemini://localhost/nowhere\r\n").await;
    assert_eq!(out, b"51 Not found\r\n".to_vec());

    shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn client_certificate_reaches_handlers() {
    let (addr, shutdown, task) = start(cert_router()).await;

    let out = fetch(addr, &connector(true), "gemini://localhost/whoami\r\n").await;
    assert_eq!(out, b"20 text/plain\r\n1 certificate(s)".to_vec());

    shutdown.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn in_flight_requests_finish_before_serve_returns() {
    let entered = Arc::new(Notify::new());
    let handler_entered = Arc::clone(&entered);
    let router = Router::new().on("/slow", move |ctx| {
        handler_entered.notify_one();
        std::thread::sleep(Duration::from_millis(200));
        ctx.set_body("done");
        Ok(())
    });
    let (addr, shutdown, task) = start(router).await;

    let client = tokio::spawn(async move {
        fetch(addr, &connector(false), "gemini://localhost/slow\r\n").await
    });
    entered.notified().await;
    shutdown.shutdown();

    let out = client.await.unwrap();
    assert_eq!(out, b"20 text/plain\r\ndone".to_vec());
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server did not drain")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn no_connections_are_accepted_after_shutdown() {
    let (addr, shutdown, task) = start(cert_router()).await;
    shutdown.shutdown();
    task.await.unwrap().unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}
