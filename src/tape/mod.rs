//! Tape subsystem.
//!
//! # Data Flow
//! ```text
//! record mode:  forwarded exchange → Interaction → store.save(tape, all records)
//! replay mode:  store.load(tape) → Vec<Interaction> → session (in memory)
//! ```

pub mod interaction;
pub mod store;

use std::path::PathBuf;

pub use interaction::{
    headers_from_map, HeaderValues, Headers, Interaction, RecordedRequest, RecordedResponse,
    Status, TapeBody,
};
pub use store::{validate_tape_name, TapeStore};

/// Error type for tape operations.
#[derive(Debug, thiserror::Error)]
pub enum TapeError {
    #[error("Invalid tape name: {0}")]
    InvalidTapeName(String),
    #[error("Tape I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Tape at {path:?} is not a valid tape document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to serialize tape: {0}")]
    Serialize(#[source] serde_yaml::Error),
}
