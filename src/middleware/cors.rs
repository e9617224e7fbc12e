//! Cross-origin resource sharing.
//!
//! Every response leaving this layer carries the four CORS headers.
//! A preflight (`OPTIONS`) request is answered here with `204 No Content`
//! and never reaches the layers or handler below.

use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, HeaderName, HeaderValue,
};
use http::{Method, StatusCode};

use super::Middleware;
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// CORS middleware configuration.
///
/// Defaults:
/// - origin: `*`
/// - methods: `GET,POST,PUT,DELETE,OPTIONS`
/// - headers: `Content-Type,Authorization`
/// - credentials: `true`
///
/// ```rust
/// use http::Method;
/// use weft::middleware::Cors;
///
/// let cors = Cors::new()
///     .allow_origin("https://example.com")
///     .allow_methods([Method::PATCH, Method::HEAD])
///     .allow_headers(["X-Custom-Header"])
///     .allow_credentials(false);
/// ```
#[derive(Clone, Debug)]
pub struct Cors {
    origin: String,
    methods: Vec<String>,
    headers: Vec<String>,
    credentials: bool,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            origin: "*".to_owned(),
            methods: [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS]
                .iter()
                .map(|m| m.as_str().to_owned())
                .collect(),
            headers: vec!["Content-Type".to_owned(), "Authorization".to_owned()],
            credentials: true,
        }
    }
}

impl Cors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().map(|m| m.as_str().to_owned()).collect();
        self
    }

    pub fn allow_headers<S: Into<String>>(mut self, headers: impl IntoIterator<Item = S>) -> Self {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    /// Renders the configuration as header pairs.
    ///
    /// # Panics
    ///
    /// Panics if a configured value is not a valid header value. This runs
    /// when the router is frozen, so a bad configuration fails at startup.
    fn header_pairs(&self) -> [(HeaderName, HeaderValue); 4] {
        let value = |s: &str| {
            HeaderValue::from_str(s).unwrap_or_else(|e| panic!("invalid CORS header value `{s}`: {e}"))
        };
        [
            (ACCESS_CONTROL_ALLOW_ORIGIN, value(self.origin.as_str())),
            (ACCESS_CONTROL_ALLOW_METHODS, value(self.methods.join(",").as_str())),
            (ACCESS_CONTROL_ALLOW_HEADERS, value(self.headers.join(",").as_str())),
            (ACCESS_CONTROL_ALLOW_CREDENTIALS, value(if self.credentials { "true" } else { "false" })),
        ]
    }
}

impl Middleware for Cors {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        Arc::new(CorsEndpoint { next, headers: Arc::from(self.header_pairs()) })
    }
}

struct CorsEndpoint {
    next: BoxedEndpoint,
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl Endpoint for CorsEndpoint {
    fn call(&self, req: Request) -> BoxFuture {
        let headers = Arc::clone(&self.headers);

        if *req.method() == Method::OPTIONS {
            return Box::pin(async move { annotate(Response::status(StatusCode::NO_CONTENT), &headers) });
        }

        let fut = self.next.call(req);
        Box::pin(async move { annotate(fut.await, &headers) })
    }
}

fn annotate(mut res: Response, headers: &[(HeaderName, HeaderValue)]) -> Response {
    for (name, value) in headers {
        res.set_header_if_absent(name.clone(), value.clone());
    }
    res
}
