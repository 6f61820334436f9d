//! Control channel.
//!
//! Requests under the control prefix never reach the proxy dispatch path:
//!
//! ```text
//! POST <prefix>/tape    {"tape": "<name>"} | {} → select / unload
//! GET  <prefix>/status                          → {"mode", "tape", "remaining"}
//! *    <prefix>/...                             → 404
//! ```

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use self::handlers::*;
use crate::http::server::AppState;

pub use handlers::ControlCommand;

pub fn setup_control_router() -> Router<AppState> {
    Router::new()
        .route("/tape", post(select_tape))
        .route("/status", get(get_status))
        .fallback(control_not_found)
}
