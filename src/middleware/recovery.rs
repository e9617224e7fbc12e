//! Panic containment.
//!
//! A panic below this layer becomes a fixed `500 Internal Server Error`
//! response instead of tearing down the connection task. Whatever response
//! the failed layers were assembling is dropped with the unwound stack.
//!
//! Responses here are values, so nothing has reached the socket before the
//! handler returns and the fallback always replaces the partial response.
//! A transport that streams bodies would not get that guarantee: bytes
//! already flushed cannot be taken back, and the fallback write may be
//! rejected or appended. That is accepted, not fixed, here.
//!
//! Headers that layers inside this one would have added are part of that
//! partial response. With `Trace` and `Cors` registered after `Recovery`,
//! the fallback 500 has no `x-trace-id` and no CORS headers. Register
//! `Trace` (and `Cors`) before `Recovery` when the 500 has to carry them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;
use crate::response::Response;

/// Middleware that converts downstream panics into `500` responses.
///
/// Register it before (outside of) every unit that might panic. Only an
/// observer that never panics itself, such as [`Logging`](super::Logging),
/// belongs further out.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recovery;

impl Middleware for Recovery {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        Arc::new(RecoveryEndpoint { next })
    }
}

struct RecoveryEndpoint {
    next: BoxedEndpoint,
}

impl Endpoint for RecoveryEndpoint {
    fn call(&self, req: Request) -> BoxFuture {
        let next = Arc::clone(&self.next);
        let method = req.method().clone();
        let path = req.path().to_owned();

        Box::pin(async move {
            // `next.call` runs inside the guarded future so that a panic while
            // building the downstream future is caught as well as one while
            // polling it.
            let guarded = AssertUnwindSafe(async move { next.call(req).await });
            match guarded.catch_unwind().await {
                Ok(res) => res,
                Err(payload) => {
                    error!(%method, path = %path, panic = panic_message(&*payload), "request handler panicked");
                    internal_server_error()
                }
            }
        })
    }
}

/// The fixed fallback response.
fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .text("Internal Server Error\n")
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::handler::Handler;

    fn request() -> Request {
        Request::from(http::Request::get("/").body(Bytes::new()).unwrap())
    }

    async fn boom(_req: Request) -> Response {
        panic!("something went wrong")
    }

    async fn ok(_req: Request) -> Response {
        Response::builder().status(StatusCode::OK).text("OK")
    }

    /// Endpoint whose `call` panics before it ever returns a future.
    struct PanicsEagerly;

    impl Endpoint for PanicsEagerly {
        fn call(&self, _req: Request) -> BoxFuture {
            panic!("eager")
        }
    }

    #[tokio::test]
    async fn panic_becomes_500() {
        let res = Recovery.wrap(boom.into_endpoint()).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body().as_ref(), b"Internal Server Error\n");
    }

    #[tokio::test]
    async fn eager_panic_becomes_500() {
        let res = Recovery.wrap(Arc::new(PanicsEagerly)).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn normal_response_passes_through() {
        let res = Recovery.wrap(ok.into_endpoint()).call(request()).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"OK");
    }

    #[tokio::test]
    async fn partial_response_is_discarded() {
        async fn partial(_req: Request) -> Response {
            Response::builder().header("x-partial", "1").text("half")
        }
        let faulty = crate::middleware::from_fn(|req, next| async move {
            let res = next.run(req).await;
            if res.header("x-partial").is_some() {
                panic!("fault after downstream responded");
            }
            res
        });
        let endpoint = Recovery.wrap(faulty.wrap(partial.into_endpoint()));

        let res = endpoint.call(request()).await;

        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.header("x-partial").is_none());
        assert_eq!(res.body().as_ref(), b"Internal Server Error\n");
    }

    #[tokio::test]
    async fn fallback_keeps_headers_from_outer_layers_only() {
        use crate::middleware::{Cors, Trace};

        let req = || Request::from(
            http::Request::get("/").header("x-trace-id", "t-1").body(Bytes::new()).unwrap(),
        );

        let trace_inside = Recovery.wrap(Cors::new().wrap(Trace.wrap(boom.into_endpoint())));
        let res = trace_inside.call(req()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.header("x-trace-id").is_none());
        assert!(res.header("access-control-allow-origin").is_none());

        let trace_outside = Trace.wrap(Cors::new().wrap(Recovery.wrap(boom.into_endpoint())));
        let res = trace_outside.call(req()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("x-trace-id"), Some("t-1"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn panic_message_reads_both_string_kinds() {
        let s: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(&*s), "static");
        assert_eq!(panic_message(&*owned), "owned");
        assert_eq!(panic_message(&*other), "<non-string panic payload>");
    }
}
