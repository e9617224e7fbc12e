//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! Routes, middleware layers and mounted routers all have different concrete
//! types, yet every one of them must slot into the same chain. They are all
//! hidden behind one trait object, [`Endpoint`], and shared as
//! [`BoxedEndpoint`].
//!
//! The chain from user code to vtable call is:
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_endpoint()                            ← Handler blanket impl
//!        ↓
//! Arc::new(FnEndpoint(hello))                      ← heap-allocated wrapper
//!        ↓  stored as BoxedEndpoint = Arc<dyn Endpoint>
//! middleware.wrap(endpoint)                        ← each layer adds one more Arc
//!        ↓
//! endpoint.call(req)  at request time              ← one vtable call per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Pin<Box<…>>` lets the runtime poll the future in place; `Send + 'static`
/// lets tokio move it across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Anything that turns a [`Request`] into a [`Response`].
///
/// Route handlers, middleware layers and frozen routers all implement it.
/// Implement it yourself when writing a middleware unit that needs more
/// than [`from_fn`](crate::middleware::from_fn) offers.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A shared, type-erased [`Endpoint`].
///
/// `Arc` gives cheap, thread-safe shared ownership: one atomic increment
/// per clone, no copy of the handler itself.
pub type BoxedEndpoint = Arc<dyn Endpoint>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` (or closure returning a future) with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> BoxedEndpoint;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> BoxedEndpoint {
        Arc::new(FnEndpoint(self))
    }
}

/// Newtype bridging a concrete handler `F` into the trait-object world.
struct FnEndpoint<F>(F);

impl<F, Fut, R> Endpoint for FnEndpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
