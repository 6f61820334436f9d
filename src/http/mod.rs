//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto connection, origin-form check, body buffering)
//!     → request.rs (request ID, IncomingRequest snapshot)
//!     → control channel | proxy core
//!     → response.rs (recorded response → wire response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{IncomingRequest, RequestId, RequestIdExt};
pub use server::{AppState, HttpServer, ServerError};
