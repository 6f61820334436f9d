//! Replay matching subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, headers, body)
//!     → RecordMatcher::find over the active tape, in tape order
//!     → first record whose predicates all pass
//!     → caller removes it by RecordId (consume-on-match)
//! ```
//!
//! # Design Decisions
//! - Deterministic: scan order is tape order, first match wins
//! - Matching never mutates; removal belongs to the session so that
//!   find-and-remove happens under one lock

pub mod matcher;

use axum::http::HeaderName;

use crate::config::MatchingConfig;
use crate::http::request::IncomingRequest;
use crate::proxy::session::RecordId;
use crate::tape::RecordedRequest;

pub use matcher::{AndMatcher, BodyMatcher, HeaderMatcher, Matcher, MethodMatcher, PathMatcher};

/// Selects which recorded interaction answers an incoming request.
#[derive(Debug)]
pub struct RecordMatcher {
    predicate: AndMatcher,
}

impl RecordMatcher {
    /// Method + path only.
    pub fn exact() -> Self {
        Self {
            predicate: AndMatcher::new(vec![Box::new(MethodMatcher), Box::new(PathMatcher)]),
        }
    }

    /// Method + path, refined by the configured header and body predicates.
    pub fn from_config(config: &MatchingConfig) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> = vec![Box::new(MethodMatcher), Box::new(PathMatcher)];

        for name in &config.headers {
            match HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes()) {
                Ok(name) => matchers.push(Box::new(HeaderMatcher::new(name))),
                Err(_) => tracing::warn!(header = %name, "Ignoring invalid header name in matching config"),
            }
        }
        if config.body {
            matchers.push(Box::new(BodyMatcher));
        }

        Self {
            predicate: AndMatcher::new(matchers),
        }
    }

    /// Return the id of the first candidate that matches, in iteration order.
    pub fn find<'a, I>(&self, candidates: I, incoming: &IncomingRequest) -> Option<RecordId>
    where
        I: IntoIterator<Item = (RecordId, &'a RecordedRequest)>,
    {
        candidates
            .into_iter()
            .find(|(_, recorded)| self.predicate.matches(recorded, incoming))
            .map(|(id, _)| id)
    }
}

impl Default for RecordMatcher {
    fn default() -> Self {
        Self::exact()
    }
}
