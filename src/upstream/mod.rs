//! Upstream subsystem (record mode only).
//!
//! # Data Flow
//! ```text
//! IncomingRequest
//!     → forwarder.rs (rewrite target, replace host, send full body)
//!     → upstream host
//!     → full response collected
//!     → Interaction (closed snapshot, ready to append to the tape)
//! ```

pub mod forwarder;

use std::time::Duration;

pub use forwarder::{Forwarder, Upstream, UpstreamClient};

/// Error type for upstream exchanges.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream unreachable: {0}")]
    Unreachable(#[source] hyper_util::client::legacy::Error),
    #[error("Upstream response body failed: {0}")]
    Body(#[source] hyper::Error),
    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Could not build upstream request: {0}")]
    InvalidRequest(#[source] axum::http::Error),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Invalid upstream URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}
