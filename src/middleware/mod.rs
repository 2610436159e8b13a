//! Built-in middleware.
//!
//! Middleware is an ordinary callback registered with
//! [`Router::middleware`](crate::Router::middleware) or
//! [`Router::middleware_on`](crate::Router::middleware_on). It decides whether
//! the rest of the chain runs by calling [`Context::next`], and can inspect
//! or rewrite the response once `next` returns.
//!
//! ```rust
//! use mercury::{Router, middleware};
//!
//! let app = Router::new()
//!     .middleware(middleware::trace)
//!     .middleware_on("/account", middleware::require_certificate);
//! ```

use std::time::Instant;

use tracing::info;

use crate::{Context, Error, Status};

/// Logs path, status and latency of every request it wraps.
///
/// Errors from the rest of the chain are passed through untouched; the logged
/// status is what the client sees when the chain succeeds.
pub fn trace(ctx: &mut Context<'_>) -> Result<(), Error> {
    let start = Instant::now();
    let result = ctx.next();

    let path = ctx.request().path();
    let latency_us = start.elapsed().as_micros() as u64;
    match &result {
        Ok(()) => info!(path, status = ctx.response().status(), latency_us, "request"),
        Err(e) => info!(path, error = %e, latency_us, "request failed"),
    }
    result
}

/// Answers `60 Client certificate required` unless the client presented a
/// certificate.
pub fn require_certificate(ctx: &mut Context<'_>) -> Result<(), Error> {
    if ctx.client_certificates().is_empty() {
        return Err(Error::status(
            Status::ClientCertificateRequired,
            "Client certificate required",
        ));
    }
    ctx.next()
}
