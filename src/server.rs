//! Gemini server, per-connection driver and graceful shutdown.
//!
//! # One request per connection
//!
//! Every accepted connection is served on its own task:
//!
//! 1. TLS handshake (client certificate optional).
//! 2. Read up to 1026 bytes, stopping at the first CRLF.
//! 3. Decode, dispatch through the route chain and encode, on the blocking
//!    pool so handlers may block.
//! 4. Write the response and close. There is no keep-alive.
//!
//! # Shutdown
//!
//! [`ShutdownHandle::shutdown`] (or Ctrl-C / SIGTERM when using
//! [`Server::serve`]) stops the accept loop. Connections already accepted run
//! to completion before `serve` returns.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::context::{Context, Peer};
use crate::error::Error;
use crate::handler::{ErrorHandler, default_error_handler};
use crate::request::{MAX_REQUEST_LEN, Request};
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::tls::{self, Identity};

/// The Gemini server.
///
/// ```rust,no_run
/// use mercury::{Router, Server};
///
/// # async fn run() -> Result<(), mercury::Error> {
/// let server = Server::builder()
///     .bind(":1965")
///     .cert_files("cert.pem", "key.pem")
///     .build()?;
///
/// server.serve(Router::new().on("/", |ctx| {
///     ctx.set_body("Hello world!\n");
///     Ok(())
/// })).await
/// # }
/// ```
pub struct Server {
    config: Config,
    tls: Arc<rustls::ServerConfig>,
    error_handler: ErrorHandler,
    shutdown: ShutdownHandle,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            config: Config::default(),
            identity: None,
            error_handler: Arc::new(default_error_handler),
        }
    }

    /// Builds a server from a loaded [`Config`] with the default error handler.
    pub fn from_config(config: Config) -> Result<Self, Error> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle that stops the accept loop from anywhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accepts connections until Ctrl-C, SIGTERM or
    /// [`ShutdownHandle::shutdown`], then waits for in-flight connections.
    ///
    /// Waiting is bounded by the read and write timeouts. With both disabled,
    /// a client that connects and never sends anything keeps `serve` from
    /// returning.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves instead
    /// of on process signals.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        self.serve_on(listener, router, signal).await
    }

    /// Serves on a listener the caller already bound, ignoring the configured
    /// address. Binding `127.0.0.1:0` this way gives a free port whose address
    /// is known before serving starts.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let local_addr = listener.local_addr()?;

        if self.config.startup_message {
            eprintln!("{BANNER}");
            eprintln!("listening on gemini://{local_addr}");
        }
        info!(addr = %local_addr, "mercury listening");

        let acceptor = TlsAcceptor::from(Arc::clone(&self.tls));
        // One copy of the routing table for every connection task.
        let app = Arc::new(App {
            router,
            error_handler: Arc::clone(&self.error_handler),
            server_name: self.config.server_name.clone(),
            debug: self.config.debug,
            read_timeout: self.config.read_timeout(),
            write_timeout: self.config.write_timeout(),
        });

        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.notified() => {
                    if self.shutdown.is_closed() {
                        break;
                    }
                }

                () = &mut signal => {
                    self.shutdown.shutdown();
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            if self.shutdown.is_closed() {
                                break;
                            }
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let acceptor = acceptor.clone();
                    let app = Arc::clone(&app);
                    tasks.spawn(async move {
                        if let Err(e) = handle_tls(acceptor, stream, remote_addr, app).await {
                            warn!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished tasks so the set stays small on long runs.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        info!(in_flight = tasks.len(), "shutting down, draining connections");
        while tasks.join_next().await.is_some() {}

        info!("mercury stopped");
        Ok(())
    }
}

const BANNER: &str = r"
 _ __ ___   ___ _ __ ___ _   _ _ __ _   _
| '_ ` _ \ / _ \ '__/ __| | | | '__| | | |
| | | | | |  __/ | | (__| |_| | |  | |_| |
|_| |_| |_|\___|_|  \___|\__,_|_|   \__, |
                                    |___/ ";

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent, validating builder for [`Server`].
///
/// Every setter overrides the matching [`Config`] field; [`build`] checks the
/// result and loads the certificate, failing fast on anything wrong.
///
/// [`build`]: ServerBuilder::build
pub struct ServerBuilder {
    config: Config,
    identity: Option<Identity>,
    error_handler: ErrorHandler,
}

impl ServerBuilder {
    /// Replaces every configuration field at once.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Loads the certificate chain and key from PEM files at build time.
    pub fn cert_files(mut self, cert: impl Into<std::path::PathBuf>, key: impl Into<std::path::PathBuf>) -> Self {
        self.config.cert_file = Some(cert.into());
        self.config.key_file = Some(key.into());
        self
    }

    /// Uses an already loaded identity; takes precedence over cert files.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = Some(name.into());
        self
    }

    /// Bounds the TLS handshake and, separately, the request read. Zero
    /// disables it.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_secs = timeout.as_secs();
        self
    }

    /// Bounds the response write. Zero disables it.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_secs = timeout.as_secs();
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    pub fn startup_message(mut self, enabled: bool) -> Self {
        self.config.startup_message = enabled;
        self
    }

    /// Replaces [`default_error_handler`].
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut Response, &Error) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn build(self) -> Result<Server, Error> {
        self.config.validate()?;

        let identity = match (self.identity, &self.config.cert_file, &self.config.key_file) {
            (Some(identity), _, _) => identity,
            (None, Some(cert), Some(key)) => Identity::from_pem_files(cert, key)?,
            _ => return Err(ConfigError::MissingIdentity.into()),
        };

        Ok(Server {
            tls: tls::server_config(identity)?,
            config: self.config,
            error_handler: self.error_handler,
            shutdown: ShutdownHandle::default(),
        })
    }
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

/// Stops a running [`Server`] from accepting new connections.
///
/// Cheap to clone; every clone controls the same server.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownState>,
}

#[derive(Debug, Default)]
struct ShutdownState {
    closed: Mutex<bool>,
    notify: Notify,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        *self.closed() = true;
        // Stores a permit if the accept loop is not waiting yet.
        self.inner.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed()
    }

    fn closed(&self) -> std::sync::MutexGuard<'_, bool> {
        // A bool cannot be left half-written.
        self.inner.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn notified(&self) {
        self.inner.notify.notified().await;
    }
}

// ── Connection handling ───────────────────────────────────────────────────────

/// Everything a connection task needs, shared read-only across tasks.
pub(crate) struct App {
    pub(crate) router: Router,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) server_name: Option<String>,
    pub(crate) debug: bool,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
}

async fn handle_tls(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    remote_addr: std::net::SocketAddr,
    app: Arc<App>,
) -> Result<(), Error> {
    let stream = within(app.read_timeout, acceptor.accept(stream)).await??;

    let certificates = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let peer = Peer::new(Some(remote_addr), certificates);

    serve_connection(stream, peer, app).await
}

/// Serves exactly one request on an established stream, then closes it.
pub(crate) async fn serve_connection<S>(mut stream: S, peer: Peer, app: Arc<App>) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = within(app.read_timeout, read_request(&mut stream)).await??;
    if raw.is_empty() {
        debug!("peer closed before sending a request");
        return Ok(());
    }

    let dispatcher = Arc::clone(&app);
    let response = tokio::task::spawn_blocking(move || dispatcher.respond(&raw, &peer))
        .await
        .map_err(Error::other)?;

    // The error handler could not produce a response; drop the connection.
    let Some(bytes) = response else {
        return Ok(());
    };

    if app.debug {
        debug!(response = %String::from_utf8_lossy(&bytes), "sending response");
    }

    within(app.write_timeout, async {
        stream.write_all(&bytes).await?;
        stream.shutdown().await
    })
    .await??;
    Ok(())
}

/// Reads until the first CRLF, EOF, or [`MAX_REQUEST_LEN`] bytes.
async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; MAX_REQUEST_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        // A CR may have arrived at the end of the previous read.
        let scan_from = filled.saturating_sub(1);
        filled += n;
        if buf[scan_from..filled].windows(2).any(|w| w == b"\r\n") {
            break;
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn within<F: Future>(limit: Option<Duration>, fut: F) -> io::Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        None => Ok(fut.await),
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

impl App {
    /// Core path: turns one raw request into the bytes to send back.
    ///
    /// `None` means even the error response failed and the connection must be
    /// closed without writing anything.
    pub(crate) fn respond(&self, raw: &[u8], peer: &Peer) -> Option<Vec<u8>> {
        let request = match Request::decode(raw) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejecting request");
                return self.recover(&e.into());
            }
        };

        let mut ctx = Context::new(&request, peer, self.router.chain());
        let result = self.check_host(&request).and_then(|()| ctx.next());

        if let Err(e) = result {
            debug!(url = %request.url(), error = %e, "dispatch failed");
            if let Err(fatal) = (self.error_handler)(ctx.response_mut(), &e) {
                error!(error = %e, "error handler failed: {fatal}");
                return None;
            }
        }

        let response = ctx.into_response();
        match response.encode() {
            Ok(bytes) => {
                debug!(url = %request.url(), status = response.status(), "request served");
                Some(bytes)
            }
            Err(e) => {
                warn!(url = %request.url(), error = %e, "response cannot be encoded");
                self.recover(&e.into())
            }
        }
    }

    /// Builds an error response from scratch for `err`.
    fn recover(&self, err: &Error) -> Option<Vec<u8>> {
        let mut response = Response::default();
        if let Err(fatal) = (self.error_handler)(&mut response, err) {
            error!(error = %err, "error handler failed: {fatal}");
            return None;
        }
        match response.encode() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(error = %err, "error response cannot be encoded: {e}");
                None
            }
        }
    }

    fn check_host(&self, request: &Request) -> Result<(), Error> {
        let Some(name) = &self.server_name else {
            return Ok(());
        };
        match request.host() {
            Some(host) if host.eq_ignore_ascii_case(name) => Ok(()),
            _ => Err(Error::status(Status::ProxyRequestRefused, "Proxy request refused")),
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first Ctrl-C or (on Unix) SIGTERM the process receives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    fn app(router: Router) -> App {
        App {
            router,
            error_handler: Arc::new(default_error_handler),
            server_name: None,
            debug: false,
            read_timeout: None,
            write_timeout: None,
        }
    }

    fn hello_router() -> Router {
        Router::new().on("/hello/:name", |ctx| {
            let name = ctx.param_or("name", "").to_owned();
            ctx.set_body(format!("Hello {name}!"));
            Ok(())
        })
    }

    #[test]
    fn serves_matching_handler() {
        let out = app(hello_router()).respond(b"gemini://host/hello/Abi\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"20 text/plain\r\nHello Abi!".to_vec());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let out = app(hello_router()).respond(b"gemini://host/goodbye/Abi\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"51 Not found\r\n".to_vec());
    }

    #[test]
    fn decode_errors_become_bad_requests() {
        let out = app(hello_router()).respond(b"gem.example.com\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"59 Request URL has no scheme\r\n".to_vec());

        let out = app(hello_router()).respond(b"garbage", &Peer::default());
        assert_eq!(out.unwrap(), b"59 Malformed request\r\n".to_vec());
    }

    #[test]
    fn failing_handler_body_is_discarded() {
        let router = Router::new().on("/", |ctx| {
            ctx.set_body("half a page");
            Err(Error::other("database on fire"))
        });
        let out = app(router).respond(b"gemini://host/\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"40 Temporary failure\r\n".to_vec());
    }

    #[test]
    fn impossible_response_is_replaced() {
        let router = Router::new().on("/", |ctx| {
            ctx.set_status(Status::NotFound);
            ctx.set_body("but with a body");
            Ok(())
        });
        let out = app(router).respond(b"gemini://host/\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"40 Temporary failure\r\n".to_vec());
    }

    #[test]
    fn custom_error_handler_is_used() {
        let mut app = app(Router::new());
        app.error_handler = Arc::new(|res: &mut Response, err: &Error| -> Result<(), Error> {
            crate::normalize(res, err);
            res.set_meta(format!("custom: {err}"))?;
            Ok(())
        });
        let out = app.respond(b"gemini://host/\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"51 custom: not found\r\n".to_vec());
    }

    #[test]
    fn failing_error_handler_drops_connection() {
        let mut app = app(Router::new());
        app.error_handler =
            Arc::new(|_: &mut Response, _: &Error| -> Result<(), Error> { Err(Error::other("no")) });
        assert!(app.respond(b"gemini://host/\r\n", &Peer::default()).is_none());
        assert!(app.respond(b"nonsense\r\n", &Peer::default()).is_none());
    }

    #[test]
    fn oversized_error_message_falls_back_to_generic_failure() {
        let router = Router::new().on("/", |_| Err(Error::status(Status::Gone, "x".repeat(2000))));
        let out = app(router).respond(b"gemini://host/\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"40 Temporary failure\r\n".to_vec());
    }

    #[test]
    fn unencodable_error_response_drops_connection() {
        let mut app = app(Router::new());
        app.error_handler = Arc::new(|res: &mut Response, err: &Error| -> Result<(), Error> {
            crate::normalize(res, err);
            res.set_content("error responses cannot have a body");
            Ok(())
        });
        assert!(app.respond(b"gemini://host/\r\n", &Peer::default()).is_none());
    }

    #[test]
    fn foreign_hosts_are_refused() {
        let mut app = app(hello_router());
        app.server_name = Some("gem.example.com".to_owned());

        let out = app.respond(b"gemini://other.example.com/hello/x\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"53 Proxy request refused\r\n".to_vec());

        let out = app.respond(b"gemini://GEM.example.com/hello/x\r\n", &Peer::default());
        assert_eq!(out.unwrap(), b"20 text/plain\r\nHello x!".to_vec());
    }

    #[tokio::test]
    async fn connection_round_trip() {
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(serve_connection(server, Peer::default(), Arc::new(app(hello_router()))));

        client.write_all(b"gemini://host/hello/World\r\nignored").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"20 text/plain\r\nHello World!".to_vec());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn request_split_across_writes() {
        let (mut client, server) = duplex(4096);
        let task = tokio::spawn(serve_connection(server, Peer::default(), Arc::new(app(hello_router()))));

        client.write_all(b"gemini://host/hel").await.unwrap();
        client.write_all(b"lo/there\r").await.unwrap();
        client.write_all(b"\n").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, b"20 text/plain\r\nHello there!".to_vec());
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn silent_client_times_out() {
        let (_client, server) = duplex(4096);
        let mut app = app(hello_router());
        app.read_timeout = Some(Duration::from_millis(20));

        let err = serve_connection(server, Peer::default(), Arc::new(app)).await.unwrap_err();
        assert!(matches!(err, Error::Io(e) if e.kind() == io::ErrorKind::TimedOut));
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let (mut client, server) = duplex(8192);
        let task = tokio::spawn(serve_connection(server, Peer::default(), Arc::new(app(hello_router()))));

        let url = format!("gemini://{}\r\n", "a".repeat(2000));
        client.write_all(url.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();

        // Only 1026 bytes are read, so no CRLF is ever seen.
        assert_eq!(out, b"59 Malformed request\r\n".to_vec());
        task.await.unwrap().unwrap();
    }

    #[test]
    fn banner_is_plain_ascii() {
        assert!(BANNER.is_ascii());
        assert!(BANNER.lines().any(|line| line.contains("|___/")));
    }

    #[test]
    fn shutdown_handle_is_shared() {
        let handle = ShutdownHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_closed());
        clone.shutdown();
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn shutdown_before_wait_is_not_lost() {
        let handle = ShutdownHandle::default();
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle.notified())
            .await
            .unwrap();
    }

    #[test]
    fn build_requires_identity() {
        let err = Server::builder().startup_message(false).build().err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::MissingIdentity)));
    }

    #[test]
    fn build_reports_unreadable_cert_files() {
        let err = Server::builder()
            .cert_files("/no/such/cert.pem", "/no/such/key.pem")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Io { .. })));
    }

    #[test]
    fn build_validates_config() {
        let err = Server::builder().bind("nowhere").build().err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::Addr(_))));
    }
}
