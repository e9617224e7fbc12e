//! Request router with a middleware stack and mountable sub-routers.
//!
//! A [`Router`] is assembled with chained builder calls and then frozen into
//! a [`RouterService`]. Freezing composes the middleware stack exactly once
//! around the dispatch table; every request afterwards runs through that
//! same composed endpoint, so nothing is rebuilt per request.
//!
//! # Dispatch order
//!
//! 1. Route registered for the request's method
//! 2. Route registered with [`Router::any`]
//! 3. Mounted router whose prefix matches, longest prefix first
//! 4. The fallback, `404 Not Found` unless replaced with [`Router::fallback`]
//!
//! A route only beats a matching mount when it is more specific than the
//! mount prefix: either fully static, or with its first `{param}` /
//! `{*rest}` segment deeper than the prefix. `any("/{*rest}")` therefore
//! never swallows `/v1/…` once a router is mounted at `/v1`, while
//! `get("/v1/special")` or `get("/v1/users/{id}")` still win over it.
//!
//! # Mounting
//!
//! [`Router::mount`] takes the child by value and freezes it, so the child's
//! own middleware runs inside the parent's. The parent's layers see the
//! original path; the child's layers and routes see the path with the prefix
//! stripped. A router can never be mounted under itself or under one of its
//! own descendants, because it has already been moved into the parent.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler};
use crate::middleware::{Middleware, Stack};
use crate::request::Request;
use crate::response::Response;

/// The application router.
///
/// ```rust
/// use weft::middleware::{Cors, Logging, Recovery, Trace};
/// use weft::{Request, Router};
///
/// async fn hello(req: Request) -> String {
///     format!("Hello {}", req.param("name").unwrap_or("stranger"))
/// }
///
/// let api = Router::new().get("/hello/{name}", hello);
///
/// let app = Router::new()
///     .get("/hello/{name}", hello)
///     .mount("/v1", api)
///     .layer(Logging::new())
///     .layer(Recovery)
///     .layer(Cors::new())
///     .layer(Trace)
///     .into_service();
/// ```
pub struct Router {
    table: RouteTable,
    stack: Stack,
}

impl Router {
    pub fn new() -> Self {
        Self {
            table: RouteTable {
                routes: HashMap::new(),
                any: MatchitRouter::new(),
                mounts: Vec::new(),
                fallback: not_found.into_endpoint(),
            },
            stack: Stack::new(),
        }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and `req.param("name")` retrieves
    /// them; a trailing `{*rest}` captures the remainder of the path.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or already registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let tree = self.table.routes.entry(method).or_default();
        insert(tree, path, handler.into_endpoint());
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    /// Register a handler for every method. A route registered for the
    /// request's exact method takes precedence.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        insert(&mut self.table.any, path, handler.into_endpoint());
        self
    }

    /// Replace the `404 Not Found` answer for requests nothing else matched.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.table.fallback = handler.into_endpoint();
        self
    }

    /// Append a middleware unit. Units run in the order they were added,
    /// around every route, mount and the fallback, regardless of whether
    /// those were registered before or after the unit.
    pub fn layer(mut self, unit: impl Middleware) -> Self {
        self.stack.push(unit);
        self
    }

    /// Delegate every request under `prefix` to `child`.
    ///
    /// `/v1` matches `/v1` and `/v1/…` but not `/v1x`. The child receives the
    /// path with the prefix removed, `/` if nothing is left, and the query
    /// string unchanged. A trailing slash on `prefix` is ignored, so `/`
    /// mounts the child at the root.
    ///
    /// # Panics
    ///
    /// Panics if `prefix` does not start with `/` or is already mounted.
    pub fn mount(mut self, prefix: &str, child: Router) -> Self {
        assert!(prefix.starts_with('/'), "mount prefix `{prefix}` must start with '/'");
        let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
        assert!(
            self.table.mounts.iter().all(|m| m.prefix != prefix),
            "mount prefix `{prefix}` is already registered",
        );

        let endpoint = Arc::new(MountEndpoint {
            prefix: prefix.to_owned(),
            child: child.into_service().endpoint,
        });
        self.table.mounts.push(Mount::new(prefix, endpoint));
        self.table.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    /// Freeze the router: compose the middleware stack around the dispatch
    /// table and return the handle the server calls for every request.
    pub fn into_service(self) -> RouterService {
        let Self { table, stack } = self;
        debug!(layers = stack.len(), mounts = table.mounts.len(), "router frozen");
        RouterService { endpoint: stack.wrap(Arc::new(table)) }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(tree: &mut MatchitRouter<Route>, path: &str, endpoint: BoxedEndpoint) {
    let route = Route { dynamic_depth: dynamic_depth(path), endpoint };
    tree.insert(path, route)
        .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
}

/// One-based index of the first segment holding a `{param}` or `{*rest}`,
/// `None` for a fully static pattern.
fn dynamic_depth(pattern: &str) -> Option<usize> {
    pattern.split('/')
        .skip(1)
        .position(|segment| segment.contains('{'))
        .map(|i| i + 1)
}

async fn not_found(_req: Request) -> Response {
    Response::builder().status(StatusCode::NOT_FOUND).text("Not Found\n")
}

// ── RouterService ─────────────────────────────────────────────────────────────

/// A frozen [`Router`]: middleware composed, routes fixed.
///
/// Cloning is one `Arc` increment; every clone shares the same composed
/// endpoint, so it can be handed to as many connection tasks as needed.
#[derive(Clone)]
pub struct RouterService {
    endpoint: BoxedEndpoint,
}

impl RouterService {
    /// Runs `req` through the middleware stack and dispatch table.
    pub fn call(&self, req: Request) -> BoxFuture {
        self.endpoint.call(req)
    }
}

// ── Dispatch table ────────────────────────────────────────────────────────────

struct RouteTable {
    routes: HashMap<Method, MatchitRouter<Route>>,
    any: MatchitRouter<Route>,
    /// Sorted longest prefix first.
    mounts: Vec<Mount>,
    fallback: BoxedEndpoint,
}

struct Route {
    dynamic_depth: Option<usize>,
    endpoint: BoxedEndpoint,
}

impl Route {
    fn outranks(&self, mount: &Mount) -> bool {
        self.dynamic_depth.is_none_or(|depth| depth > mount.depth)
    }
}

type Params = HashMap<String, String>;

impl RouteTable {
    /// Method-specific match first, then the method-less one. Either is
    /// dropped when `mount` is more specific for this path.
    fn lookup(&self, method: &Method, path: &str, mount: Option<&Mount>) -> Option<(BoxedEndpoint, Params)> {
        let method_match = self.routes.get(method).and_then(|tree| tree.at(path).ok());
        let any_match = self.any.at(path).ok();

        let matched = [method_match, any_match]
            .into_iter()
            .flatten()
            .find(|m| mount.is_none_or(|mount| m.value.outranks(mount)))?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((Arc::clone(&matched.value.endpoint), params))
    }
}

impl Endpoint for RouteTable {
    fn call(&self, mut req: Request) -> BoxFuture {
        let mount = self.mounts.iter().find(|m| m.matches(req.path()));
        if let Some((endpoint, params)) = self.lookup(req.method(), req.path(), mount) {
            req.params = params;
            return endpoint.call(req);
        }
        if let Some(mount) = mount {
            return mount.endpoint.call(req);
        }
        debug!(method = %req.method(), path = req.path(), "no route matched");
        self.fallback.call(req)
    }
}

struct Mount {
    prefix: String,
    /// Number of segments in `prefix`; `0` for a root mount.
    depth: usize,
    endpoint: BoxedEndpoint,
}

impl Mount {
    fn new(prefix: &str, endpoint: BoxedEndpoint) -> Self {
        let depth = prefix.split('/').skip(1).count();
        Self { prefix: prefix.to_owned(), depth, endpoint }
    }

    /// Exact prefix, then either the end of the path or a `/`.
    fn matches(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Terminal action of a mount binding: rewrite the path, call the child.
struct MountEndpoint {
    prefix: String,
    child: BoxedEndpoint,
}

impl Endpoint for MountEndpoint {
    fn call(&self, mut req: Request) -> BoxFuture {
        // Unreachable through `RouteTable`, which only calls a mount whose
        // prefix matched.
        let Some(rest) = req.path().strip_prefix(self.prefix.as_str()) else {
            return Box::pin(not_found(req));
        };
        let rest = if rest.is_empty() { "/".to_owned() } else { rest.to_owned() };

        debug!(prefix = %self.prefix, from = req.path(), to = %rest, "delegating to mounted router");
        req.set_path(&rest);
        req.params.clear();
        self.child.call(req)
    }
}
