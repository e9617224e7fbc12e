//! HTTP server and graceful shutdown.
//!
//! # Shutdown
//!
//! On **SIGTERM** or **SIGINT** (or when the future passed to
//! [`Server::serve_with_shutdown`] resolves) the server:
//! 1. Immediately stops `listener.accept()` — no new connections are made.
//! 2. Gives in-flight connection tasks up to the grace period to finish.
//! 3. Aborts whatever is still running and returns from `serve`.
//!
//! Step 3 is best effort: a response cut off there may be half written or
//! never sent. Requests never wait on each other; a slow handler only holds
//! up its own connection task.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Router, RouterService};

/// How long in-flight requests get to finish after a shutdown signal.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
    grace_period: Duration,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a valid `host:port` string.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::time::Duration;
    /// use weft::Server;
    ///
    /// let server = Server::bind("0.0.0.0:8080").grace_period(Duration::from_secs(5));
    /// ```
    pub fn bind(addr: &str) -> Self {
        let addr: SocketAddr = addr
            .parse()
            .unwrap_or_else(|e| panic!("invalid socket address `{addr}`: {e}"));
        Self { addr, grace_period: DEFAULT_GRACE_PERIOD }
    }

    /// Upper bound on the shutdown drain. Defaults to [`DEFAULT_GRACE_PERIOD`].
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Serves `router` until `signal` resolves, then drains.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "weft listening");
        run(listener, router.into_service(), signal, self.grace_period).await;
        Ok(())
    }
}

/// Accept loop. Split out from [`Server`] so tests can bind an ephemeral port.
async fn run(
    listener: TcpListener,
    service: RouterService,
    signal: impl Future<Output = ()>,
    grace_period: Duration,
) {
    // JoinSet tracks every spawned connection task so we can wait for
    // them all to finish during graceful shutdown.
    let mut tasks = JoinSet::new();

    tokio::pin!(signal);

    loop {
        tokio::select! {
            // Check shutdown first so a signal stops accepting immediately,
            // even if more connections are queued.
            biased;

            () = &mut signal => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let service = service.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let service = service.clone();
                        async move { dispatch(service, req).await }
                    });

                    // `auto::Builder` speaks HTTP/1.1 and HTTP/2, whichever
                    // the client negotiates.
                    if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await
                    {
                        debug!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the JoinSet does not grow
            // without bound on long-running servers.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    let drain = async { while tasks.join_next().await.is_some() {} };
    if tokio::time::timeout(grace_period, drain).await.is_err() {
        warn!(abandoned = tasks.len(), ?grace_period, "grace period elapsed, aborting connections");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    info!("weft stopped");
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request body, runs the router, and hands the response to hyper.
///
/// The error type is [`Infallible`](std::convert::Infallible): every failure
/// is turned into a response before hyper sees it.
async fn dispatch(
    service: RouterService,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_inner());
        }
    };

    let req = Request::from(http::Request::from_parts(parts, body));
    Ok(service.call(req).await.into_inner())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves — on non-Unix platforms the SIGTERM arm is
    // effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    use super::*;
    use crate::middleware::{Cors, Recovery, Trace};

    async fn hello(req: Request) -> String {
        format!("Hello {}", req.param("name").unwrap_or("?"))
    }

    async fn slow(_req: Request) -> &'static str {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "too late"
    }

    async fn send(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut buf = Vec::new();
        // An aborted connection may be reset rather than closed.
        let _ = stream.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn serves_requests_through_the_stack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = Router::new()
            .get("/hello/{name}", hello)
            .mount("/v1", Router::new().get("/hello/{name}", hello))
            .layer(Recovery)
            .layer(Cors::new())
            .layer(Trace)
            .into_service();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(run(listener, service, async { stopped.await.ok(); }, DEFAULT_GRACE_PERIOD));

        let raw = send(addr, "GET /v1/hello/bob HTTP/1.1\r\nHost: test\r\nX-Trace-Id: t-1\r\nConnection: close\r\n\r\n").await;

        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.to_ascii_lowercase().contains("x-trace-id: t-1"), "{raw}");
        assert!(raw.to_ascii_lowercase().contains("access-control-allow-origin: *"), "{raw}");
        assert!(raw.ends_with("Hello bob"), "{raw}");

        stop.send(()).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_abandons_requests_past_the_grace_period() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = Router::new().get("/slow", slow).into_service();
        let (stop, stopped) = oneshot::channel::<()>();
        let grace = Duration::from_millis(50);
        let server = tokio::spawn(run(listener, service, async { stopped.await.ok(); }, grace));

        let client = tokio::spawn(send(addr, "GET /slow HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop within the grace period")
            .unwrap();
        let raw = client.await.unwrap();
        assert!(!raw.contains("too late"), "{raw}");
    }
}
