//! Unified error type.

use std::fmt;

use http::StatusCode;

use crate::response::{IntoResponse, Response};

/// The error type returned by weft's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`] values, not as `Error`s. This type surfaces infrastructure
/// failures: binding a port, accepting a connection, decoding a body.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)   => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "decode json: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e)   => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A malformed body is the caller's fault; anything else is ours.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::Io(_)   => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Response::builder().status(status).text(self.to_string())
    }
}
