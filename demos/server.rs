//! weft demo — profile lookup, greetings and redirects, mounted twice.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example server
//!
//! Try:
//!   curl -i http://localhost:8080/profile/alice
//!   curl -i http://localhost:8080/v1/hello/bob
//!   curl -i -H 'X-Trace-Id: my-trace' http://localhost:8080/v1/profile/bob
//!   curl -i http://localhost:8080/redirect/example
//!   curl -i -X OPTIONS http://localhost:8080/anything
//!   curl -i http://localhost:8080/some/other/path

use serde::Serialize;
use tracing_subscriber::EnvFilter;
use weft::middleware::{Cors, Logging, Recovery, Trace};
use weft::{IntoResponse, Json, Request, Response, Router, Server, StatusCode};

#[derive(Serialize)]
struct Profile {
    name: &'static str,
    age: u32,
    addr: &'static str,
}

fn find_profile(name: &str) -> Option<Profile> {
    match name {
        "alice" => Some(Profile { name: "Alice", age: 30, addr: "Wonderland" }),
        "bob"   => Some(Profile { name: "Bob", age: 25, addr: "Builderland" }),
        _       => None,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = std::env::var("WEFT_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());

    let app = routes()
        .mount("/v1", routes())
        .layer(Logging::new())
        .layer(Recovery)
        .layer(Cors::new())
        .layer(Trace);

    Server::bind(&addr)
        .serve(app)
        .await
        .expect("server error");
}

fn routes() -> Router {
    Router::new()
        .get("/profile/{name}", profile)
        .get("/hello/{name}", hello)
        .get("/redirect/{domain}", redirect)
        .fallback(all_paths)
}

async fn all_paths(_req: Request) -> &'static str {
    "all path\n"
}

// GET /profile/{name}
async fn profile(req: Request) -> Response {
    match req.param("name").and_then(find_profile) {
        Some(p) => Json(p).into_response(),
        None => (StatusCode::NOT_FOUND, "Profile not found\n").into_response(),
    }
}

// GET /hello/{name}
async fn hello(req: Request) -> String {
    let name = req.param("name").unwrap_or_default();
    format!("Hello world\nHello {name}")
}

// GET /redirect/{domain} → 301 https://{domain}.com
async fn redirect(req: Request) -> Response {
    let domain = req.param("domain").unwrap_or_default();
    Response::redirect(StatusCode::MOVED_PERMANENTLY, &format!("https://{domain}.com"))
}
