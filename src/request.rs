//! Incoming HTTP request type and its request-scoped [`Context`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::error::Error;

// ── Context ───────────────────────────────────────────────────────────────────

/// Values scoped to a single request's trip through the middleware chain.
///
/// A `Context` is immutable: layers derive a new one with the `with_*`
/// methods and hand it downstream inside the [`Request`]. Nothing here is
/// global and nothing outlives the request that carries it.
#[derive(Clone, Debug, Default)]
pub struct Context {
    trace_id: Option<Arc<str>>,
}

impl Context {
    /// The correlation identifier, or `""` when no trace layer has run.
    pub fn trace_id(&self) -> &str {
        self.trace_id.as_deref().unwrap_or("")
    }

    /// Returns a copy of this context carrying `id` as its trace identifier.
    pub fn with_trace_id(&self, id: impl Into<Arc<str>>) -> Self {
        Self { trace_id: Some(id.into()) }
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request with its body fully read.
///
/// Build one from an [`http::Request`] — the server does this for every
/// connection, and tests can do it directly:
///
/// ```rust
/// use bytes::Bytes;
/// use weft::Request;
///
/// let req = Request::from(
///     http::Request::get("/hello/bob?lang=en").body(Bytes::new()).unwrap(),
/// );
/// assert_eq!(req.path(), "/hello/bob");
/// assert_eq!(req.query(), Some("lang=en"));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) context: Context,
}

impl Request {
    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn context(&self) -> &Context { &self.context }

    /// Shorthand for `req.context().trace_id()`.
    pub fn trace_id(&self) -> &str { self.context.trace_id() }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Decodes the body as JSON.
    ///
    /// The error renders as `400 Bad Request`, so handlers can simply
    /// `return err.into_response()`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Replaces the path, keeping the query string.
    pub(crate) fn set_path(&mut self, path: &str) {
        let path_and_query = match self.uri.query() {
            Some(q) => format!("{path}?{q}"),
            None    => path.to_owned(),
        };
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = path_and_query.parse().ok();
        if let Ok(uri) = Uri::from_parts(parts) {
            self.uri = uri;
        }
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            context: Context::default(),
        }
    }
}
