//! Per-request dispatch state.
//!
//! # How dispatch walks the chain
//!
//! A [`Context`] owns a single cursor into the router's chain. Every call to
//! [`Context::next`] moves that cursor forward past non-matching entries, runs
//! the first matching one, and returns whatever it returned. Middleware calls
//! `next()` from inside its own body to hand the request on:
//!
//! ```text
//! driver ── next() ─▶ [0] trace (mw, matches)
//!                          └─ next() ─▶ [1] admin auth (mw, skipped)
//!                                       [2] /hello/:name (handler, matches)
//!                                            └─ returns Ok(())
//!                          ◀── Ok(())
//! ```
//!
//! Because the cursor lives on the context and not on the call stack, each
//! entry is looked at exactly once per request no matter how deeply the calls
//! nest, and nothing is ever revisited.

use std::net::SocketAddr;
use std::path::Path;

use rustls::pki_types::CertificateDer;
use url::Url;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Route, matches};
use crate::status::Status;

/// What is known about the other end of the connection.
#[derive(Clone, Debug, Default)]
pub struct Peer {
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) certificates: Vec<CertificateDer<'static>>,
}

impl Peer {
    pub fn new(remote_addr: Option<SocketAddr>, certificates: Vec<CertificateDer<'static>>) -> Self {
        Self { remote_addr, certificates }
    }
}

/// The state of one request as it moves through the route chain.
///
/// Handlers and middleware receive `&mut Context` and use it to read the
/// request and shape the response. The response starts out as
/// `20 text/plain` with an empty body.
pub struct Context<'a> {
    request: &'a Request,
    peer: &'a Peer,
    chain: &'a [Route],
    response: Response,
    cursor: usize,
    // Index of the entry whose callback is currently running.
    current: Option<usize>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(request: &'a Request, peer: &'a Peer, chain: &'a [Route]) -> Self {
        Self {
            request,
            peer,
            chain,
            response: Response::default(),
            cursor: 0,
            current: None,
        }
    }

    /// Runs the next entry in the chain that matches this request.
    ///
    /// Fails with [`Error::NotFound`] once the chain is exhausted. Errors
    /// raised by the entry are returned unchanged.
    pub fn next(&mut self) -> Result<(), Error> {
        let chain = self.chain;
        loop {
            let Some(route) = chain.get(self.cursor) else {
                return Err(Error::NotFound);
            };
            let index = self.cursor;
            self.cursor += 1;

            if !matches(self.request.components(), route) {
                continue;
            }

            let outer = self.current.replace(index);
            let result = (route.handler)(self);
            self.current = outer;
            return result;
        }
    }

    // ── Response ──────────────────────────────────────────────────────────────

    pub fn set_status(&mut self, status: impl Into<u8>) {
        self.response.set_status(status);
    }

    /// Sets the meta field. What it means depends on the status: a MIME type
    /// for `20`, a prompt for `10`, a URL for `3x`, an error message otherwise.
    pub fn set_meta(&mut self, meta: impl Into<String>) -> Result<(), Error> {
        self.response.set_meta(meta).map_err(Error::from)
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.response.set_content(body);
    }

    /// Uses the contents of the file at `path` as the body.
    pub fn set_body_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let body = std::fs::read(path)?;
        self.response.set_content(body);
        Ok(())
    }

    /// The body being built. `Vec<u8>` implements [`std::io::Write`], so
    /// `write!(ctx.body_mut(), ...)` appends to it.
    pub fn body_mut(&mut self) -> &mut Vec<u8> {
        self.response.content_mut()
    }

    pub fn clear_body(&mut self) {
        self.response.clear_content();
    }

    pub fn response(&self) -> &Response { &self.response }
    pub fn response_mut(&mut self) -> &mut Response { &mut self.response }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request { self.request }
    pub fn url(&self) -> &Url { self.request.url() }

    /// Returns a named path parameter of the running entry's pattern.
    ///
    /// For a handler registered at `/hello/:name`, a request for `/hello/Abi`
    /// gives `param("name") == Some("Abi")`. Names are case-insensitive;
    /// values keep the case the client sent.
    pub fn param(&self, name: &str) -> Option<&str> {
        let route = &self.chain[self.current?];
        let index = route.pattern.iter().position(|part| {
            part.strip_prefix(':')
                .is_some_and(|key| key.eq_ignore_ascii_case(name))
        })?;
        self.request.raw_components().get(index).map(String::as_str)
    }

    pub fn param_or<'s>(&'s self, name: &str, default: &'s str) -> &'s str {
        self.param(name).unwrap_or(default)
    }

    /// The raw (still percent-encoded) query string, if one was sent.
    pub fn raw_query(&self) -> Option<&str> {
        self.request.raw_query()
    }

    pub fn raw_query_or<'s>(&'s self, default: &'s str) -> &'s str {
        self.raw_query().unwrap_or(default)
    }

    // ── Peer ──────────────────────────────────────────────────────────────────

    /// The certificate chain the client presented; empty if it sent none.
    pub fn client_certificates(&self) -> &[CertificateDer<'static>] {
        &self.peer.certificates
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer.remote_addr
    }

    /// Ends the request with `status` and `message`, dropping any body.
    ///
    /// Shorthand for the common `10` (input) and `3x` (redirect) replies,
    /// where meta carries a prompt or a URL instead of an error.
    pub fn reply(&mut self, status: Status, message: impl Into<String>) -> Result<(), Error> {
        self.response.set_meta(message)?;
        self.response.clear_content();
        self.response.set_status(status);
        Ok(())
    }
}
