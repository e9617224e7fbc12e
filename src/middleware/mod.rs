//! Middleware layer.
//!
//! A middleware unit is a transformation from "the rest of the chain" to
//! "a chain with me in front": `BoxedEndpoint → BoxedEndpoint`. Units hold
//! configuration only; per-request state lives in the endpoint they build
//! or in the future that endpoint returns.
//!
//! # Call order
//!
//! ```text
//! Stack [m1, m2, m3] around handler h
//!
//!   request  ─▶ m1 ─▶ m2 ─▶ m3 ─▶ h
//!   response ◀─ m1 ◀─ m2 ◀─ m3 ◀─ h
//! ```
//!
//! The first unit registered is the outermost: it sees the request first
//! and the response last. A unit that returns without calling `next`
//! short-circuits everything below it.
//!
//! # Built-in units
//!
//! - [`Trace`]    — correlation id in the request context and `x-trace-id` header
//! - [`Recovery`] — converts a panic anywhere below into `500 Internal Server Error`
//! - [`Logging`]  — one access entry per request: method, path, status, latency
//! - [`Cors`]     — CORS headers on every response, `204` for preflight
//!
//! A sensible order is `Logging, Recovery, Cors, Trace`: the access log then
//! records the 500 that `Recovery` produces. That 500 carries neither the
//! trace id nor CORS headers, since both are added by layers it replaced;
//! `Logging, Trace, Cors, Recovery` keeps them on it.

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;
use crate::response::Response;

mod cors;
mod logging;
mod recovery;
mod trace;

pub use cors::Cors;
pub use logging::{AccessEntry, AccessSink, Logging, TracingSink};
pub use recovery::Recovery;
pub use trace::{TRACE_ID_HEADER, Trace};

// ── Middleware trait ──────────────────────────────────────────────────────────

/// A request/response interceptor.
///
/// Called once, when the router is frozen, with the endpoint it should
/// guard. Any `Fn(BoxedEndpoint) -> BoxedEndpoint` closure qualifies.
pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint;
}

impl<F> Middleware for F
where
    F: Fn(BoxedEndpoint) -> BoxedEndpoint + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        self(next)
    }
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// The remainder of the chain, handed to a [`from_fn`] closure.
#[derive(Clone)]
pub struct Next(BoxedEndpoint);

impl Next {
    /// Runs every layer below this one, then the handler.
    pub async fn run(&self, req: Request) -> Response {
        self.0.call(req).await
    }
}

/// Builds a middleware unit from an async closure.
///
/// ```rust
/// use weft::middleware::{self, Next};
/// use weft::{Request, Router};
///
/// let app = Router::new().layer(middleware::from_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", "weft".parse().unwrap());
///     res
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(Arc::new(f))
}

/// Middleware returned by [`from_fn`].
pub struct FromFn<F>(Arc<F>);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        Arc::new(FromFnEndpoint { f: Arc::clone(&self.0), next: Next(next) })
    }
}

struct FromFnEndpoint<F> {
    f: Arc<F>,
    next: Next,
}

impl<F, Fut> Endpoint for FromFnEndpoint<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        Box::pin((self.f)(req, self.next.clone()))
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// Folds `units` around `terminal`, first unit outermost.
///
/// An empty slice returns `terminal` itself, not a wrapper around it.
pub fn compose(units: &[Arc<dyn Middleware>], terminal: BoxedEndpoint) -> BoxedEndpoint {
    units.iter().rev().fold(terminal, |next, unit| unit.wrap(next))
}

/// An ordered sequence of middleware units.
///
/// A `Stack` is itself a [`Middleware`], so stacks nest.
#[derive(Clone, Default)]
pub struct Stack {
    units: Vec<Arc<dyn Middleware>>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `unit` inside every unit already in the stack.
    pub fn layer(mut self, unit: impl Middleware) -> Self {
        self.push(unit);
        self
    }

    pub(crate) fn push(&mut self, unit: impl Middleware) {
        self.units.push(Arc::new(unit));
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Middleware for Stack {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        compose(&self.units, next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::handler::Handler;

    type CallLog = Arc<Mutex<Vec<&'static str>>>;

    fn request() -> Request {
        Request::from(http::Request::get("/").body(Bytes::new()).unwrap())
    }

    fn recorder(log: CallLog, name: &'static str) -> impl Middleware {
        from_fn(move |req, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                let res = next.run(req).await;
                log.lock().unwrap().push(name);
                res
            }
        })
    }

    fn terminal(log: &CallLog) -> BoxedEndpoint {
        let log = Arc::clone(log);
        (move |_req: Request| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("final");
                Response::text("OK")
            }
        })
        .into_endpoint()
    }

    #[tokio::test]
    async fn stack_calls_in_registration_order_and_returns_in_reverse() {
        let log = CallLog::default();
        let stack = Stack::new()
            .layer(recorder(log.clone(), "mw1"))
            .layer(recorder(log.clone(), "mw2"))
            .layer(recorder(log.clone(), "mw3"));

        let res = stack.wrap(terminal(&log)).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            ["mw1", "mw2", "mw3", "final", "mw3", "mw2", "mw1"],
        );
    }

    #[tokio::test]
    async fn empty_stack_is_identity() {
        let log = CallLog::default();
        let h = terminal(&log);

        let composed = compose(&[], Arc::clone(&h));

        assert!(Arc::ptr_eq(&composed, &h));
        composed.call(request()).await;
        assert_eq!(*log.lock().unwrap(), ["final"]);
    }

    #[tokio::test]
    async fn unit_that_skips_next_short_circuits() {
        let log = CallLog::default();
        let stack = Stack::new()
            .layer(recorder(log.clone(), "outer"))
            .layer(from_fn(|_req, _next| async { Response::status(StatusCode::FORBIDDEN) }))
            .layer(recorder(log.clone(), "inner"));

        let res = stack.wrap(terminal(&log)).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(*log.lock().unwrap(), ["outer", "outer"]);
    }

    #[tokio::test]
    async fn plain_closure_is_a_middleware() {
        let log = CallLog::default();
        let identity = |next: BoxedEndpoint| next;
        let stack = Stack::new().layer(identity).layer(recorder(log.clone(), "mw"));
        assert_eq!(stack.len(), 2);

        stack.wrap(terminal(&log)).call(request()).await;

        assert_eq!(*log.lock().unwrap(), ["mw", "final", "mw"]);
    }

    #[tokio::test]
    async fn stacks_nest() {
        let log = CallLog::default();
        let inner = Stack::new().layer(recorder(log.clone(), "b")).layer(recorder(log.clone(), "c"));
        let outer = Stack::new().layer(recorder(log.clone(), "a")).layer(inner);

        outer.wrap(terminal(&log)).call(request()).await;

        assert_eq!(*log.lock().unwrap(), ["a", "b", "c", "final", "c", "b", "a"]);
    }
}
