//! Correlation-id propagation.
//!
//! Every request leaves this layer with a trace id in its [`Context`] and
//! every response comes back with the same id in `x-trace-id`.
//!
//! ## Id sources, in order
//!
//! 1. A non-empty `x-trace-id` request header, honoured verbatim
//! 2. An id already in the request context (set by an enclosing router)
//! 3. A fresh UUID v4
//!
//! [`Context`]: crate::Context

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use tracing::debug;
use uuid::Uuid;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;

/// Header used for trace-id propagation in both directions.
pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Middleware that guarantees every request carries a trace id.
///
/// Read it downstream with [`Request::trace_id`]; without this layer that
/// returns `""`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        Arc::new(TraceEndpoint { next })
    }
}

struct TraceEndpoint {
    next: BoxedEndpoint,
}

impl Endpoint for TraceEndpoint {
    fn call(&self, mut req: Request) -> BoxFuture {
        let (id, header) = resolve_trace_id(&req);
        debug!(trace_id = %id, path = req.path(), "trace id assigned");
        req.context = req.context.with_trace_id(id);

        let fut = self.next.call(req);
        Box::pin(async move {
            let mut res = fut.await;
            if let Some(value) = header {
                res.set_header_if_absent(TRACE_ID_HEADER, value);
            }
            res
        })
    }
}

/// The id for the context, and the value to echo in the response header.
///
/// An inbound header is echoed byte for byte; it only has to be UTF-8.
fn resolve_trace_id(req: &Request) -> (String, Option<HeaderValue>) {
    let inbound = req.headers()
        .get(&TRACE_ID_HEADER)
        .filter(|v| !v.is_empty())
        .and_then(|v| Some((std::str::from_utf8(v.as_bytes()).ok()?.to_owned(), v.clone())));
    if let Some((id, value)) = inbound {
        return (id, Some(value));
    }

    let id = if req.trace_id().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        req.trace_id().to_owned()
    };
    let value = HeaderValue::from_bytes(id.as_bytes()).ok();
    (id, value)
}
