//! # mercury
//!
//! A small server framework for the [Gemini] protocol.
//!
//! [Gemini]: https://geminiprotocol.net/
//!
//! ## The protocol, in one paragraph
//!
//! The client opens a TLS connection and sends one absolute URL followed by
//! CRLF. The server answers with `<status> <meta>\r\n`, then the body for
//! success (`2x`) statuses only, and closes the connection. No headers, no
//! methods, no keep-alive.
//!
//! ## What mercury does
//!
//! - Wire framing: [`Request::decode`] and [`Response::encode`] enforce the
//!   1024-byte URL and meta limits and the "no body unless success" rule.
//! - Routing: one ordered chain of handlers (exact paths, `:param`
//!   components) and middleware (path prefixes), walked with
//!   [`Context::next`].
//! - Errors: anything a handler returns becomes a well-formed response, and
//!   internal details never reach the client.
//! - Serving: TLS via rustls, one task per connection, optional client
//!   certificates, graceful shutdown.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mercury::{Context, Error, Router, Server, Status, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let app = Router::new()
//!         .middleware(middleware::trace)
//!         .on("/", index)
//!         .on("/hello/:name", hello);
//!
//!     Server::builder()
//!         .cert_files("cert.pem", "key.pem")
//!         .build()?
//!         .serve(app)
//!         .await
//! }
//!
//! fn index(ctx: &mut Context<'_>) -> Result<(), Error> {
//!     ctx.set_meta("text/gemini")?;
//!     ctx.set_body("# Welcome\n=> /hello/world Say hello\n");
//!     Ok(())
//! }
//!
//! fn hello(ctx: &mut Context<'_>) -> Result<(), Error> {
//!     let name = ctx.param_or("name", "stranger").to_owned();
//!     if name.len() > 64 {
//!         return Err(Error::status(Status::BadRequest, "Name too long"));
//!     }
//!     ctx.set_body(format!("Hello, {name}!\n"));
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod path;
mod request;
mod response;
mod router;
mod server;
mod status;
mod tls;

pub mod middleware;

pub use config::{Config, ConfigError, DEFAULT_PORT, DEFAULT_READ_TIMEOUT_SECS};
pub use context::{Context, Peer};
pub use error::{DecodeError, EncodeError, Error, normalize};
pub use handler::{ErrorHandler, default_error_handler};
pub use path::split_path;
pub use request::{MAX_REQUEST_LEN, MAX_URL_LEN, Request, SCHEME};
pub use response::{DEFAULT_META, MAX_META_LEN, Response};
pub use router::Router;
pub use server::{Server, ServerBuilder, ShutdownHandle};
pub use status::{Status, is_success};
pub use tls::Identity;
