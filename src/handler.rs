//! Handler storage and the error-handler hook.
//!
//! # How handlers are stored
//!
//! The route chain holds handlers and middleware of *different* closure types
//! in one `Vec`, so each callback is erased behind a trait object:
//!
//! ```text
//! fn hello(ctx: &mut Context<'_>) -> Result<(), Error> { … }   ← user writes this
//!        ↓ router.on("/hello", hello)
//! Arc::new(hello)                                          ← heap-allocated once
//!        ↓  stored as BoxedHandler
//! (route.handler)(ctx)  at request time                    ← one vtable dispatch
//! ```
//!
//! Callbacks are synchronous: dispatch runs on tokio's blocking pool, so a
//! handler may read files or call blocking libraries without stalling the
//! accept loop.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, normalize};
use crate::response::Response;

/// A type-erased route callback shared by every connection task.
pub(crate) type BoxedHandler =
    Arc<dyn Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static>;

/// Turns a failure into the response the client will see.
///
/// It receives the response being built (or a fresh default one when the
/// request never decoded) and the error. It must only touch that response and
/// must not try to resume dispatch. Returning an error drops the connection
/// without writing anything.
pub type ErrorHandler = Arc<dyn Fn(&mut Response, &Error) -> Result<(), Error> + Send + Sync + 'static>;

/// The error handler used unless one is configured: see [`normalize`].
pub fn default_error_handler(response: &mut Response, err: &Error) -> Result<(), Error> {
    normalize(response, err);
    Ok(())
}
