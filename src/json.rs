//! JSON response wrapper.
//!
//! Decoding lives on [`Request::json`](crate::Request::json); this is the
//! encoding half.

use http::StatusCode;
use serde::Serialize;

use crate::response::{IntoResponse, Response};

/// Serialises `T` as a `200 OK` `application/json` response.
///
/// ```rust,ignore
/// async fn get_user(_req: Request) -> Json<User> {
///     Json(User { id: 1, name: "alice".into() })
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => Response::json(bytes),
            Err(e) => Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text(format!("encode json: {e}")),
        }
    }
}
