//! Ordered route chain.
//!
//! Handlers and middleware live in one flat list, in registration order.
//! Dispatch walks that list once per request, so order is the only priority
//! rule: the first matching entry runs, and it decides whether the rest of the
//! chain gets a turn by calling [`Context::next`](crate::Context::next).

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::path::split_path;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Role {
    /// Terminal: the pattern must match the whole path.
    Handler,
    /// Pass-through: the pattern must match a prefix of the path.
    Middleware,
}

/// One registered (pattern, callback, role) entry.
pub(crate) struct Route {
    pub(crate) pattern: Vec<String>,
    pub(crate) role: Role,
    pub(crate) handler: BoxedHandler,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
///
/// ```rust
/// use mercury::{Context, Error, Router, middleware};
///
/// fn hello(ctx: &mut Context<'_>) -> Result<(), Error> {
///     let name = ctx.param_or("name", "stranger").to_owned();
///     ctx.set_body(format!("Hello, {name}!\n"));
///     Ok(())
/// }
///
/// let app = Router::new()
///     .middleware(middleware::trace)
///     .middleware_on("/members", middleware::require_certificate)
///     .on("/hello/:name", hello);
/// ```
#[derive(Default)]
pub struct Router {
    chain: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Registers a terminal handler for `path`.
    ///
    /// Components starting with `:` are parameters, read back with
    /// [`Context::param`]. Matching is case-insensitive; a missing leading
    /// `/` is added.
    pub fn on<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(path, Role::Handler, Arc::new(handler))
    }

    /// Registers middleware for every path under `path`.
    ///
    /// Middleware runs before anything registered after it and hands control
    /// on with [`Context::next`].
    pub fn middleware_on<F>(self, path: &str, middleware: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(path, Role::Middleware, Arc::new(middleware))
    }

    /// Registers middleware for every request.
    pub fn middleware<F>(self, middleware: F) -> Self
    where
        F: Fn(&mut Context<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.middleware_on("/", middleware)
    }

    fn add(mut self, path: &str, role: Role, handler: BoxedHandler) -> Self {
        let path = path.to_lowercase();
        let path = if path.starts_with('/') { path } else { format!("/{path}") };
        self.chain.push(Route { pattern: split_path(&path), role, handler });
        self
    }

    pub(crate) fn chain(&self) -> &[Route] {
        &self.chain
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("chain", &self.chain).finish()
    }
}

/// Whether `route` applies to a request split into `components`.
pub(crate) fn matches(components: &[String], route: &Route) -> bool {
    match route.role {
        Role::Handler => {
            route.pattern.len() == components.len()
                && components_match(&route.pattern, components)
        }
        Role::Middleware => {
            // Registered at "/": covers every request.
            if route.pattern.iter().all(String::is_empty) {
                return true;
            }
            route.pattern.len() <= components.len()
                && components_match(&route.pattern, &components[..route.pattern.len()])
        }
    }
}

fn components_match(pattern: &[String], components: &[String]) -> bool {
    pattern
        .iter()
        .zip(components)
        .all(|(p, c)| p.starts_with(':') || p == c)
}
