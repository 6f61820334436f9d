use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Response, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::http::response::plain_text;
use crate::http::server::AppState;
use crate::proxy::{ProxyError, SessionStatus, TapeSelection};

/// A parsed `POST <prefix>/tape` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    SelectTape(String),
    Unload,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TapeMessage {
    #[serde(default)]
    tape: Option<String>,
}

impl ControlCommand {
    /// Parse a control body. An empty body, a missing/null `tape` or an
    /// empty name all mean unload; anything unparseable is rejected.
    pub fn parse(body: &[u8]) -> Result<Self, ProxyError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ControlCommand::Unload);
        }

        let invalid = |e: serde_json::Error| ProxyError::InvalidControlMessage(e.to_string());

        // Derived struct impls also accept JSON arrays; only objects are messages.
        let message = match serde_json::from_slice::<Value>(body).map_err(invalid)? {
            Value::Object(fields) => {
                serde_json::from_value::<TapeMessage>(Value::Object(fields)).map_err(invalid)?
            }
            other => {
                return Err(ProxyError::InvalidControlMessage(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(match message.tape {
            Some(name) if !name.is_empty() => ControlCommand::SelectTape(name),
            _ => ControlCommand::Unload,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub async fn select_tape(State(state): State<AppState>, body: Bytes) -> Response<Body> {
    let command = match ControlCommand::parse(&body) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected control message");
            return e.into_response();
        }
    };

    let requested = match &command {
        ControlCommand::SelectTape(name) => Some(name.as_str()),
        ControlCommand::Unload => None,
    };

    match state.core.select_tape(requested).await {
        Ok(TapeSelection::Selected(name)) => {
            plain_text(StatusCode::OK, format!("Updated tape: {name}"))
        }
        Ok(TapeSelection::Unloaded) => plain_text(StatusCode::OK, "Unloaded tape"),
        Err(e) => {
            match &e {
                ProxyError::Tape(crate::tape::TapeError::InvalidTapeName(name)) => {
                    tracing::warn!(tape = %name, "Refused tape name outside tape root")
                }
                other => tracing::error!(error = %other, "Tape switch failed"),
            }
            e.into_response()
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SessionStatus> {
    Json(state.core.status().await)
}

pub async fn control_not_found(uri: Uri) -> impl IntoResponse {
    tracing::warn!(path = %uri.path(), "Unknown control operation");
    plain_text(StatusCode::NOT_FOUND, "Unknown control operation")
}
