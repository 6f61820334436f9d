//! Record matching predicates.
//!
//! # Responsibilities
//! - Match method (exact, case-sensitive as received)
//! - Match path including query string (byte-exact)
//! - Optionally match selected headers and the request body
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Predicates compare a stored request against a live one; neither side
//!   is normalized
//! - An AND of zero predicates always matches

use axum::http::HeaderName;

use crate::http::request::IncomingRequest;
use crate::tape::RecordedRequest;

/// Trait for matching a recorded request against an incoming one.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the recorded request answers the incoming one.
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool;
}

/// Matches the HTTP method exactly.
#[derive(Debug, Clone, Default)]
pub struct MethodMatcher;

impl Matcher for MethodMatcher {
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool {
        recorded.method == incoming.method.as_str()
    }
}

/// Matches path and query string exactly.
#[derive(Debug, Clone, Default)]
pub struct PathMatcher;

impl Matcher for PathMatcher {
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool {
        recorded.path == incoming.path
    }
}

/// Matches every value of one header. Absent on both sides counts as equal.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
}

impl HeaderMatcher {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool {
        let stored: Vec<&str> = recorded
            .headers
            .get(self.name.as_str())
            .map(|values| values.iter().collect())
            .unwrap_or_default();
        // Same view as the tape: values that are not UTF-8 were never stored.
        let live: Vec<&str> = incoming
            .headers
            .get_all(&self.name)
            .iter()
            .filter_map(|v| std::str::from_utf8(v.as_bytes()).ok())
            .collect();

        stored == live
    }
}

/// Matches the request body byte for byte.
#[derive(Debug, Clone, Default)]
pub struct BodyMatcher;

impl Matcher for BodyMatcher {
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool {
        recorded.body.as_bytes() == incoming.body.as_ref()
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, recorded: &RecordedRequest, incoming: &IncomingRequest) -> bool {
        self.matchers.iter().all(|m| m.matches(recorded, incoming))
    }
}
