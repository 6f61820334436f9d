//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Record mode needs a usable upstream URL
//! - Control prefix and default tape must be well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{Mode, ProxyConfig};
use crate::tape::store::validate_tape_name;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new(
            "listener.max_connections",
            "must be greater than zero",
        ));
    }

    match (config.mode, &config.upstream) {
        (Mode::Record, None) => errors.push(ValidationError::new(
            "upstream.url",
            "an upstream is required in record mode",
        )),
        (_, Some(upstream)) => {
            if let Err(message) = check_upstream_url(&upstream.url) {
                errors.push(ValidationError::new("upstream.url", message));
            }
        }
        (Mode::Replay, None) => {}
    }

    let extension = &config.tapes.extension;
    if extension.is_empty() || extension.contains(|c: char| matches!(c, '/' | '\\' | '.')) {
        errors.push(ValidationError::new(
            "tapes.extension",
            "must be a bare extension such as `yml`",
        ));
    }
    if validate_tape_name(&config.tapes.default_tape).is_err() {
        errors.push(ValidationError::new(
            "tapes.default_tape",
            format!("`{}` is not a valid tape name", config.tapes.default_tape),
        ));
    }

    let prefix = config.control.prefix.trim_end_matches('/');
    if !prefix.starts_with('/') || prefix.len() < 2 {
        errors.push(ValidationError::new(
            "control.prefix",
            "must start with `/` and name at least one segment",
        ));
    } else if !prefix[1..].split('/').all(is_literal_segment) {
        errors.push(ValidationError::new(
            "control.prefix",
            format!("`{prefix}` must be made of literal, non-empty path segments"),
        ));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.connect_secs",
            "must be greater than zero",
        ));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.upstream_secs",
            "must be greater than zero",
        ));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new(
            "limits.max_body_size",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A segment the router treats as plain text: no captures, wildcards or
/// query/fragment characters.
fn is_literal_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with(':')
        && !segment.contains(|c: char| matches!(c, '*' | '{' | '}' | '?' | '#'))
}

fn check_upstream_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("`{raw}` is not a URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme `{}`", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err(format!("`{raw}` has no host"));
    }
    Ok(())
}
