//! # weft
//!
//! A minimal HTTP request pipeline: a router, an ordered stack of
//! cross-cutting middleware around it, and routers mounted inside routers.
//!
//! ## The model
//!
//! - A **handler** is any `async fn(Request) -> impl IntoResponse`.
//! - A **middleware unit** turns "the rest of the chain" into "the chain with
//!   me in front" ([`Middleware::wrap`](middleware::Middleware::wrap)).
//! - A **router** dispatches by method and path pattern, wraps its dispatch
//!   table in its middleware stack, and can delegate a whole path prefix to
//!   another router.
//!
//! ```text
//! request ─▶ Logging ─▶ Recovery ─▶ Cors ─▶ Trace ─▶ routes / mounts / fallback
//!                                                          │
//!                                           /v1/… ─▶ child router (own stack)
//! ```
//!
//! Request-scoped values travel with the request in its [`Context`]; there
//! is no global or task-local state.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use weft::middleware::{Cors, Logging, Recovery, Trace};
//! use weft::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let v1 = Router::new()
//!         .get("/users/{id}", get_user)
//!         .layer(Trace);
//!
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .mount("/v1", v1)
//!         .layer(Logging::new())
//!         .layer(Recovery)
//!         .layer(Cors::new())
//!         .layer(Trace);
//!
//!     Server::bind("0.0.0.0:8080").serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     match req.param("id") {
//!         Some(id) => Response::json(format!(r#"{{"id":"{id}","trace":"{}"}}"#, req.trace_id())),
//!         None => Response::status(StatusCode::NOT_FOUND),
//!     }
//! }
//! ```

mod error;
mod handler;
mod json;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, BoxedEndpoint, Endpoint, Handler};
pub use json::Json;
pub use request::{Context, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Router, RouterService};
pub use server::{DEFAULT_GRACE_PERIOD, Server};

pub use http::{Method, StatusCode};
