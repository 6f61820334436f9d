//! Network layer.
//!
//! # Data Flow
//! ```text
//! listener.rs (bind, bounded accept)
//!     → TcpStream + ConnectionPermit
//!     → http::server (one hyper connection task per stream)
//! ```

pub mod listener;

pub use listener::{ConnectionPermit, Listener, ListenerError};
