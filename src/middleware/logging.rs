//! Access logging.
//!
//! One [`AccessEntry`] per request, recorded after the response has come
//! back through every inner layer. The layer never touches the response:
//! it reads the status and measures time, nothing else.
//!
//! Where entries go is a constructor argument, not process state. The
//! default [`TracingSink`] emits a `tracing` event; tests and embedders pass
//! their own [`AccessSink`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use tracing::info;

use super::Middleware;
use crate::handler::{BoxFuture, BoxedEndpoint, Endpoint};
use crate::request::Request;

/// What the logging layer observed about one request.
#[derive(Clone, Debug)]
pub struct AccessEntry {
    pub method: Method,
    /// The path as this layer saw it; inside a mounted router that is the
    /// path with the mount prefix stripped.
    pub path: String,
    pub status: StatusCode,
    pub elapsed: Duration,
}

/// `GET /hello/bob 200 1.234ms`
impl fmt::Display for AccessEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {:?}", self.method, self.path, self.status.as_u16(), self.elapsed)
    }
}

/// Destination for access entries.
///
/// Implemented for any `Fn(&AccessEntry)`.
pub trait AccessSink: Send + Sync + 'static {
    fn record(&self, entry: &AccessEntry);
}

impl<F> AccessSink for F
where
    F: Fn(&AccessEntry) + Send + Sync + 'static,
{
    fn record(&self, entry: &AccessEntry) {
        self(entry)
    }
}

/// Emits each entry as an INFO event with `method`, `path`, `status` and
/// `elapsed` fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl AccessSink for TracingSink {
    fn record(&self, entry: &AccessEntry) {
        info!(
            method = %entry.method,
            path = %entry.path,
            status = entry.status.as_u16(),
            elapsed = ?entry.elapsed,
            "request completed"
        );
    }
}

/// Middleware that records method, path, status and latency per request.
#[derive(Clone)]
pub struct Logging {
    sink: Arc<dyn AccessSink>,
}

impl Logging {
    /// Logs through [`TracingSink`].
    pub fn new() -> Self {
        Self::with_sink(TracingSink)
    }

    pub fn with_sink(sink: impl AccessSink) -> Self {
        Self { sink: Arc::new(sink) }
    }
}

impl Default for Logging {
    fn default() -> Self { Self::new() }
}

impl Middleware for Logging {
    fn wrap(&self, next: BoxedEndpoint) -> BoxedEndpoint {
        Arc::new(LoggingEndpoint { next, sink: Arc::clone(&self.sink) })
    }
}

struct LoggingEndpoint {
    next: BoxedEndpoint,
    sink: Arc<dyn AccessSink>,
}

impl Endpoint for LoggingEndpoint {
    fn call(&self, req: Request) -> BoxFuture {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.path().to_owned();
        let sink = Arc::clone(&self.sink);
        let fut = self.next.call(req);

        Box::pin(async move {
            let res = fut.await;
            sink.record(&AccessEntry {
                method,
                path,
                status: res.status_code(),
                elapsed: start.elapsed(),
            });
            res
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::handler::Handler;
    use crate::response::Response;

    fn request(method: Method, path: &str) -> Request {
        Request::from(
            http::Request::builder().method(method).uri(path).body(Bytes::new()).unwrap(),
        )
    }

    fn collecting() -> (Logging, Arc<Mutex<Vec<AccessEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&entries);
        let logging = Logging::with_sink(move |e: &AccessEntry| sink.lock().unwrap().push(e.clone()));
        (logging, entries)
    }

    #[tokio::test]
    async fn records_ok_status_and_passes_body_through() {
        let (logging, entries) = collecting();
        let endpoint = logging.wrap((|_req: Request| async { "hello" }).into_endpoint());

        let res = endpoint.call(request(Method::GET, "/testpath")).await;

        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"hello");
        let entries = entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].method, Method::GET);
        assert_eq!(entries[0].path, "/testpath");
        assert_eq!(entries[0].status, StatusCode::OK);
    }

    #[tokio::test]
    async fn records_custom_status() {
        let (logging, entries) = collecting();
        let endpoint = logging.wrap((|_req: Request| async { StatusCode::IM_A_TEAPOT }).into_endpoint());

        let res = endpoint.call(request(Method::POST, "/teapot")).await;

        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        let entry = entries.lock().unwrap()[0].clone();
        assert_eq!(entry.to_string().split(' ').take(3).collect::<Vec<_>>(), ["POST", "/teapot", "418"]);
    }

    #[tokio::test]
    async fn status_defaults_to_200() {
        let (logging, entries) = collecting();
        let endpoint = logging.wrap((|_req: Request| async { Response::builder().no_body() }).into_endpoint());

        endpoint.call(request(Method::GET, "/default")).await;

        assert_eq!(entries.lock().unwrap()[0].status, StatusCode::OK);
    }

    #[tokio::test]
    async fn measures_handler_duration() {
        let (logging, entries) = collecting();
        let endpoint = logging.wrap(
            (|_req: Request| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "done"
            })
            .into_endpoint(),
        );

        endpoint.call(request(Method::GET, "/duration")).await;

        let entry = entries.lock().unwrap()[0].clone();
        assert_eq!(entry.path, "/duration");
        assert!(entry.elapsed >= Duration::from_millis(10), "elapsed {:?}", entry.elapsed);
        assert!(entry.to_string().ends_with("ms"), "{entry}");
    }

    /// `io::Write` into a shared buffer, for capturing formatted log output.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn tracing_sink_emits_all_fields() {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let endpoint = Logging::new().wrap(
            (|_req: Request| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                StatusCode::CREATED
            })
            .into_endpoint(),
        );
        endpoint.call(request(Method::PUT, "/items/7")).await;

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("method=PUT"), "{output}");
        assert!(output.contains("path=/items/7"), "{output}");
        assert!(output.contains("status=201"), "{output}");
        assert!(output.contains("elapsed="), "{output}");
        assert!(output.contains("ms"), "{output}");
    }
}
