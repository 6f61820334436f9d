//! Response writing.
//!
//! # Responsibilities
//! - Turn a stored or freshly forwarded response into a client response
//! - Copy status, headers and body verbatim
//! - Produce plain-text error responses
//!
//! # Design Decisions
//! - Headers with an empty value are skipped, never written as empty
//! - Header names/values that are not valid HTTP are logged and skipped
//! - An out-of-range stored status becomes 500

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};

use crate::tape::RecordedResponse;

/// Build the client-facing response for a recorded interaction.
pub fn write_recorded(recorded: &RecordedResponse) -> Response<Body> {
    let status = StatusCode::from_u16(recorded.status.code).unwrap_or_else(|_| {
        tracing::warn!(code = recorded.status.code, "Stored status code is invalid");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut response = Response::new(Body::from(recorded.body.clone().into_bytes()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, values) in &recorded.headers {
        let header_name = match HeaderName::from_bytes(name.as_bytes()) {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(header = %name, "Skipping invalid header name");
                continue;
            }
        };
        for value in values.iter().filter(|v| !v.is_empty()) {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.append(header_name.clone(), v);
                }
                Err(_) => tracing::warn!(header = %name, "Skipping invalid header value"),
            }
        }
    }

    response
}

/// Plain-text response used by the control channel and error paths.
pub fn plain_text(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        axum::http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
