//! Admission of inbound envelopes.
//!
//! The application identifier is looked up in the immutable config; this is
//! not authentication in a cryptographic sense, it only selects which
//! upstream project receives the envelope.

use crate::config::{Config, Project};
use http::HeaderValue;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GateError {
    #[error("application identifier header is missing")]
    MissingIdentifier,

    #[error("unknown application identifier: {0}")]
    UnknownApplication(String),
}

/// Resolves the identifier header to the project that should receive the envelope.
pub fn admit<'c>(
    header_value: Option<&HeaderValue>,
    config: &'c Config,
) -> Result<&'c Project, GateError> {
    let header_value = header_value
        .filter(|value| !value.is_empty())
        .ok_or(GateError::MissingIdentifier)?;

    // Ids may be any UTF-8, while `HeaderValue::to_str` only accepts visible ASCII
    let app_id = std::str::from_utf8(header_value.as_bytes()).map_err(|_| {
        GateError::UnknownApplication(String::from_utf8_lossy(header_value.as_bytes()).into())
    })?;

    config
        .projects
        .get(app_id)
        .ok_or_else(|| GateError::UnknownApplication(app_id.to_string()))
}
