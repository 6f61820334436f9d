//! HTTP record/replay proxy library.
//!
//! In record mode every request is forwarded to one upstream and the
//! exchange is appended to the active tape on disk. In replay mode requests
//! are answered from the active tape, each recorded exchange at most once.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Record/replay
pub mod control;
pub mod matching;
pub mod proxy;
pub mod tape;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
