//! Interaction records and the on-disk tape document.
//!
//! A tape file is a YAML document with a single `http_interactions` key:
//!
//! ```yaml
//! http_interactions:
//!   - request:
//!       method: GET
//!       path: /users?page=2
//!       body: ''
//!       headers:
//!         accept: application/json
//!     response:
//!       status:
//!         code: 200
//!       headers:
//!         content-type: application/json
//!         set-cookie:
//!           - a=1
//!           - b=2
//!       body: '{"users":[]}'
//! ```
//!
//! Bodies that are not valid UTF-8 are written as `{ base64: ... }`.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Header name → one or many values. Names are stored as received
/// (hyper lowercases them).
pub type Headers = BTreeMap<String, HeaderValues>;

/// One captured request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    /// Path including the query string; never scheme or host.
    pub path: String,
    #[serde(default)]
    pub body: TapeBody,
    #[serde(default)]
    pub headers: Headers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: TapeBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default = "default_status_code")]
    pub code: u16,
}

// A stored record without a status code is an anomaly; 200 is the fallback.
fn default_status_code() -> u16 {
    200
}

impl Default for Status {
    fn default() -> Self {
        Self {
            code: default_status_code(),
        }
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Self { code }
    }
}

/// Value(s) of a single header. A lone value serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            HeaderValues::One(value) => std::slice::from_ref(value),
            HeaderValues::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    fn push(&mut self, value: String) {
        match self {
            HeaderValues::One(first) => {
                let first = std::mem::take(first);
                *self = HeaderValues::Many(vec![first, value]);
            }
            HeaderValues::Many(values) => values.push(value),
        }
    }
}

/// Collect an `http::HeaderMap` into the tape representation, grouping
/// repeated headers under one name in arrival order.
///
/// Values that are not valid UTF-8 are left off the tape rather than
/// stored altered.
pub fn headers_from_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        let Ok(value) = std::str::from_utf8(value.as_bytes()) else {
            tracing::warn!(header = %name, "Skipping header value that is not valid UTF-8");
            continue;
        };
        let value = value.to_string();
        match headers.get_mut(name.as_str()) {
            Some(existing) => existing.push(value),
            None => {
                headers.insert(name.as_str().to_string(), HeaderValues::One(value));
            }
        }
    }
    headers
}

/// Raw body bytes, kept byte-exact through a YAML round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "BodyRepr", into = "BodyRepr")]
pub struct TapeBody(Bytes);

impl TapeBody {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for TapeBody {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&str> for TapeBody {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BodyRepr {
    Text(String),
    Encoded { base64: String },
}

impl From<TapeBody> for BodyRepr {
    fn from(body: TapeBody) -> Self {
        match std::str::from_utf8(&body.0) {
            Ok(text) => BodyRepr::Text(text.to_string()),
            Err(_) => BodyRepr::Encoded {
                base64: STANDARD.encode(&body.0),
            },
        }
    }
}

impl TryFrom<BodyRepr> for TapeBody {
    type Error = base64::DecodeError;

    fn try_from(repr: BodyRepr) -> Result<Self, Self::Error> {
        match repr {
            BodyRepr::Text(text) => Ok(TapeBody(Bytes::from(text))),
            BodyRepr::Encoded { base64 } => Ok(TapeBody(Bytes::from(STANDARD.decode(base64)?))),
        }
    }
}

/// Top-level document written to a tape file.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TapeDocument {
    #[serde(default)]
    pub http_interactions: Vec<Interaction>,
}

#[derive(Serialize)]
pub(crate) struct TapeDocumentRef<'a> {
    pub http_interactions: &'a [Interaction],
}

pub(crate) fn to_yaml(interactions: &[Interaction]) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&TapeDocumentRef {
        http_interactions: interactions,
    })
}

pub(crate) fn from_yaml(content: &str) -> Result<Vec<Interaction>, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: TapeDocument = serde_yaml::from_str(content)?;
    Ok(document.http_interactions)
}
