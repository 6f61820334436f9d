//! Record/replay orchestration.
//!
//! # Data Flow
//! ```text
//! IncomingRequest
//!     → ProxyCore::handle
//!         record: forwarder → lock session → append → save tape → response
//!         replay: lock session → find + remove → stored response
//!
//! Control channel
//!     → ProxyCore::select_tape
//!         record: lock session → save empty tape → replace session
//!         replay: lock session → load tape (or empty) → replace session
//! ```
//!
//! # Design Decisions
//! - Mode is fixed at construction; dispatch holds only what its mode needs
//! - All session mutations happen under one `tokio::sync::Mutex`
//!   acquisition, including the disk write that must precede the response
//! - A failed save rolls the appended record back out of memory

pub mod session;

use std::time::Instant;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{Mode, ProxyConfig};
use crate::http::request::IncomingRequest;
use crate::http::response::plain_text;
use crate::matching::RecordMatcher;
use crate::observability::metrics;
use crate::tape::{Interaction, RecordedResponse, TapeError, TapeStore};
use crate::upstream::{Forwarder, Upstream, UpstreamError};

pub use session::{RecordId, Session};

/// Per-request failure. None of these affect other requests.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Malformed request: {0}")]
    MalformedTransportRequest(String),
    #[error("No matching record for {method} {path}")]
    NoMatchingRecord { method: String, path: String },
    #[error("Invalid control message: {0}")]
    InvalidControlMessage(String),
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("Failed to read request body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Tape(#[from] TapeError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Tape(TapeError::InvalidTapeName(_)) => StatusCode::FORBIDDEN,
            ProxyError::InvalidControlMessage(_) => StatusCode::BAD_REQUEST,
            ProxyError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response<Body> {
        plain_text(self.status_code(), self.to_string())
    }
}

/// Fatal problems found while building the proxy.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("record mode requires an upstream URL")]
    MissingUpstream,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Tape(#[from] TapeError),
}

/// Snapshot of the session reported by the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub mode: Mode,
    pub tape: String,
    pub remaining: usize,
}

/// Outcome of a successful tape switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapeSelection {
    Selected(String),
    Unloaded,
}

enum Dispatch {
    Record(Forwarder),
    Replay(RecordMatcher),
}

/// Owns the mode, the tape store and the active session.
pub struct ProxyCore {
    dispatch: Dispatch,
    store: TapeStore,
    default_tape: String,
    session: Mutex<Session>,
}

impl ProxyCore {
    pub fn new(config: &ProxyConfig) -> Result<Self, SetupError> {
        let dispatch = match config.mode {
            Mode::Record => {
                let upstream = config.upstream.as_ref().ok_or(SetupError::MissingUpstream)?;
                let upstream = Upstream::parse(&upstream.url)?;
                Dispatch::Record(Forwarder::new(upstream, &config.timeouts)?)
            }
            Mode::Replay => Dispatch::Replay(RecordMatcher::from_config(&config.matching)),
        };

        let store = TapeStore::from_config(&config.tapes);
        let default_tape = config.tapes.default_tape.clone();
        store.resolve_path(&default_tape)?;

        Ok(Self {
            dispatch,
            store,
            session: Mutex::new(Session::new(default_tape.clone())),
            default_tape,
        })
    }

    pub fn mode(&self) -> Mode {
        match self.dispatch {
            Dispatch::Record(_) => Mode::Record,
            Dispatch::Replay(_) => Mode::Replay,
        }
    }

    pub fn store(&self) -> &TapeStore {
        &self.store
    }

    pub fn default_tape(&self) -> &str {
        &self.default_tape
    }

    /// Load the default tape for replay. Record mode starts empty and
    /// writes nothing until the first exchange or tape switch.
    pub async fn initialize(&self) -> Result<(), ProxyError> {
        if let Dispatch::Replay(_) = self.dispatch {
            let mut session = self.session.lock().await;
            let records = self.load_or_empty(&self.default_tape).await?;
            session.replace(self.default_tape.clone(), records);
        }
        Ok(())
    }

    /// Make `tape` the active tape, or return to the default when `None`.
    pub async fn select_tape(&self, tape: Option<&str>) -> Result<TapeSelection, ProxyError> {
        let target = tape.unwrap_or(&self.default_tape);
        // Reject escapes before anything touches the filesystem.
        self.store.resolve_path(target)?;

        let mut session = self.session.lock().await;
        let records = match self.dispatch {
            Dispatch::Record(_) => {
                self.store.save(target, &[]).await?;
                Vec::new()
            }
            Dispatch::Replay(_) => self.load_or_empty(target).await?,
        };
        let previous = session.tape().to_string();
        session.replace(target, records);

        tracing::info!(
            mode = %self.mode(),
            previous = %previous,
            tape = %target,
            records = session.len(),
            "Active tape switched"
        );
        metrics::record_tape_switch(self.mode());

        Ok(match tape {
            Some(name) => TapeSelection::Selected(name.to_string()),
            None => TapeSelection::Unloaded,
        })
    }

    /// Dispatch a non-control request by mode.
    pub async fn handle(&self, request: &IncomingRequest) -> Result<RecordedResponse, ProxyError> {
        let start = Instant::now();
        let result = match &self.dispatch {
            Dispatch::Record(forwarder) => self.record(forwarder, request).await,
            Dispatch::Replay(matcher) => self.replay(matcher, request).await,
        };

        let status = match &result {
            Ok(response) => response.status.code,
            Err(e) => e.status_code().as_u16(),
        };
        metrics::record_request(self.mode(), status, start);
        result
    }

    pub async fn status(&self) -> SessionStatus {
        let session = self.session.lock().await;
        SessionStatus {
            mode: self.mode(),
            tape: session.tape().to_string(),
            remaining: session.len(),
        }
    }

    async fn record(
        &self,
        forwarder: &Forwarder,
        request: &IncomingRequest,
    ) -> Result<RecordedResponse, ProxyError> {
        let interaction = forwarder.forward(request).await?;
        let response = interaction.response.clone();

        let mut session = self.session.lock().await;
        let id = session.push(interaction);
        let tape = session.tape().to_string();
        if let Err(e) = self.store.save(&tape, &session.snapshot()).await {
            session.remove(id);
            return Err(e.into());
        }

        tracing::debug!(
            tape = %tape,
            record = %id,
            method = %request.method,
            path = %request.path,
            status = response.status.code,
            "Interaction recorded"
        );
        metrics::record_recorded();
        Ok(response)
    }

    async fn replay(
        &self,
        matcher: &RecordMatcher,
        request: &IncomingRequest,
    ) -> Result<RecordedResponse, ProxyError> {
        let mut session = self.session.lock().await;
        match session.take_match(matcher, request) {
            Some((id, interaction)) => {
                tracing::debug!(
                    tape = %session.tape(),
                    record = %id,
                    method = %request.method,
                    path = %request.path,
                    remaining = session.len(),
                    "Replaying recorded response"
                );
                Ok(interaction.response)
            }
            None => {
                tracing::warn!(
                    tape = %session.tape(),
                    method = %request.method,
                    path = %request.path,
                    "No matching record"
                );
                metrics::record_replay_miss();
                Err(ProxyError::NoMatchingRecord {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                })
            }
        }
    }

    async fn load_or_empty(&self, tape: &str) -> Result<Vec<Interaction>, TapeError> {
        match self.store.load(tape).await? {
            Some(records) => Ok(records),
            None => {
                tracing::warn!(tape = %tape, root = ?self.store.root(), "Tape not found, starting empty");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::tape::{Headers, Interaction, RecordedRequest, Status, TapeBody};
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};

    fn record(path: &str, body: &str) -> Interaction {
        Interaction {
            request: RecordedRequest {
                method: "GET".into(),
                path: path.into(),
                body: TapeBody::default(),
                headers: Headers::new(),
            },
            response: RecordedResponse {
                status: Status::from(200),
                headers: Headers::new(),
                body: TapeBody::from(body),
            },
        }
    }

    fn get(path: &str) -> IncomingRequest {
        IncomingRequest {
            method: Method::GET,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn config(mode: Mode, root: &std::path::Path) -> ProxyConfig {
        let mut config = ProxyConfig {
            mode,
            ..ProxyConfig::default()
        };
        config.tapes.root = root.to_path_buf();
        if mode == Mode::Record {
            config.upstream = Some(UpstreamConfig {
                url: "http://127.0.0.1:1".into(),
            });
        }
        config
    }

    #[test]
    fn record_mode_requires_upstream() {
        let mut config = config(Mode::Record, std::path::Path::new("tapes"));
        config.upstream = None;
        assert!(matches!(ProxyCore::new(&config), Err(SetupError::MissingUpstream)));
    }

    #[tokio::test]
    async fn replay_consumes_records_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Replay, dir.path())).unwrap();
        core.store()
            .save("t", &[record("/x", "a"), record("/x", "b")])
            .await
            .unwrap();

        core.select_tape(Some("t")).await.unwrap();
        assert_eq!(core.handle(&get("/x")).await.unwrap().body.as_bytes(), b"a");
        assert_eq!(core.handle(&get("/x")).await.unwrap().body.as_bytes(), b"b");
        let miss = core.handle(&get("/x")).await.unwrap_err();
        assert!(matches!(miss, ProxyError::NoMatchingRecord { .. }));
        assert_eq!(miss.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        // Replay never rewrites the tape.
        assert_eq!(core.store().load("t").await.unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn replay_switch_to_missing_tape_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Replay, dir.path())).unwrap();

        let selection = core.select_tape(Some("nothing-here")).await.unwrap();
        assert_eq!(selection, TapeSelection::Selected("nothing-here".into()));
        let status = core.status().await;
        assert_eq!(status.tape, "nothing-here");
        assert_eq!(status.remaining, 0);
        assert!(!dir.path().join("nothing-here.yml").exists());
    }

    #[tokio::test]
    async fn record_switch_truncates_existing_tape() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Record, dir.path())).unwrap();
        core.store().save("t", &[record("/old", "x")]).await.unwrap();

        core.select_tape(Some("t")).await.unwrap();
        assert!(core.store().load("t").await.unwrap().unwrap().is_empty());
        assert_eq!(core.status().await.remaining, 0);
    }

    #[tokio::test]
    async fn unload_returns_to_default_tape() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Replay, dir.path())).unwrap();
        core.store()
            .save(core.default_tape(), &[record("/d", "default")])
            .await
            .unwrap();

        core.select_tape(Some("other")).await.unwrap();
        assert_eq!(core.select_tape(None).await.unwrap(), TapeSelection::Unloaded);

        let status = core.status().await;
        assert_eq!(status.tape, "__default");
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test]
    async fn escaping_tape_name_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Record, dir.path())).unwrap();

        let err = core.select_tape(Some("../../etc/passwd")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Invalid tape name: ../../etc/passwd");
        assert_eq!(core.status().await.tape, "__default");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_forward_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Record, dir.path())).unwrap();
        core.select_tape(Some("t")).await.unwrap();

        let err = core.handle(&get("/x")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(_)));
        assert_eq!(core.status().await.remaining, 0);
        assert!(core.store().load("t").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn initialize_loads_default_tape_in_replay() {
        let dir = tempfile::tempdir().unwrap();
        let core = ProxyCore::new(&config(Mode::Replay, dir.path())).unwrap();
        core.store()
            .save("__default", &[record("/a", "1"), record("/b", "2")])
            .await
            .unwrap();

        core.initialize().await.unwrap();
        assert_eq!(core.status().await.remaining, 2);
    }
}
