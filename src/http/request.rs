//! Request handling.
//!
//! # Responsibilities
//! - Assign a unique request ID for log correlation
//! - Reject transport-level garbage (no origin-form path)
//! - Hold the fully buffered request that matching and forwarding consume
//!
//! # Design Decisions
//! - The request ID lives in request extensions, never in headers, so it
//!   is not forwarded upstream and never lands on a tape

use std::fmt;

use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, Method, Request, Uri};
use uuid::Uuid;

/// Unique identifier attached to each inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Access the request ID stored in a request's extensions.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<RequestId> {
        self.extensions().get::<RequestId>().copied()
    }
}

impl RequestIdExt for Parts {
    fn request_id(&self) -> Option<RequestId> {
        self.extensions.get::<RequestId>().copied()
    }
}

/// Path plus query of an origin-form request target.
///
/// Authority-form (`CONNECT host:443`) and asterisk-form (`OPTIONS *`)
/// targets have no such path and are not proxyable.
pub fn origin_form_path(uri: &Uri) -> Option<&str> {
    let path_and_query = uri.path_and_query()?;
    if path_and_query.path().starts_with('/') {
        Some(path_and_query.as_str())
    } else {
        None
    }
}

/// A fully buffered inbound request, as seen by the matcher and forwarder.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    /// Path including query string.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        Self {
            method: parts.method.clone(),
            path: origin_form_path(&parts.uri)
                .unwrap_or_else(|| parts.uri.path())
                .to_string(),
            headers: parts.headers.clone(),
            body,
        }
    }
}
