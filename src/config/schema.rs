//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;

/// Root configuration for the record/replay proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Whether the proxy records against an upstream or replays tapes.
    pub mode: Mode,

    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Tape storage location and naming.
    pub tapes: TapeConfig,

    /// Upstream host used in record mode.
    pub upstream: Option<UpstreamConfig>,

    /// Reserved control namespace.
    pub control: ControlConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Extra predicates applied when replaying.
    pub matching: MatchingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Operating mode, fixed for the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward to the upstream and append every exchange to the active tape.
    Record,
    /// Answer only from the active tape's unconsumed records.
    #[default]
    Replay,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Replay => "replay",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record" => Ok(Mode::Record),
            "replay" => Ok(Mode::Replay),
            other => Err(ConfigError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 1024,
        }
    }
}

/// Where tapes live and how their files are named.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TapeConfig {
    /// Root directory; every tape file resolves beneath it.
    pub root: PathBuf,

    /// File extension appended to the tape name (without the dot).
    pub extension: String,

    /// Tape that is active at startup and after an unload.
    pub default_tape: String,
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("tapes"),
            extension: "yml".to_string(),
            default_tape: "__default".to_string(),
        }
    }
}

/// Upstream host configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Upstream base URL (`scheme://host[:port]`).
    pub url: String,
}

/// Control namespace configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Path prefix reserved for control requests.
    pub prefix: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            prefix: "/__control".to_string(),
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Total time for an upstream exchange (send + full response) in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

/// Additional replay predicates on top of method + path.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MatchingConfig {
    /// Header names whose values must also be equal.
    pub headers: Vec<String>,

    /// Require byte-exact request bodies.
    pub body: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
