use crate::forwarder::TransportError;
use crate::gate::GateError;
use http::StatusCode;
use thiserror::Error;

/// Result type alias for tunnel operations
pub type Result<T, E = TunnelError> = std::result::Result<T, E>;

/// Errors that stop the tunnel from serving.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
}

/// Errors that end a single tunnel request. None of them affect other requests.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error("failed to read request body: {0}")]
    BodyReadFailure(String),

    #[error("failed to send envelope upstream: {0}")]
    TransportFailure(TransportError),

    #[error("upstream responded with {0}")]
    UpstreamRejected(StatusCode),
}

impl RequestError {
    /// Status returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            RequestError::Gate(_) | RequestError::BodyReadFailure(_) => StatusCode::BAD_REQUEST,
            RequestError::TransportFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RequestError::UpstreamRejected(status) => *status,
        }
    }

    /// Message returned to the caller. Never includes upstream details.
    pub fn public_message(&self) -> &'static str {
        match self {
            RequestError::OriginNotAllowed(_) => "origin not allowed",
            RequestError::Gate(GateError::MissingIdentifier) => {
                "application identifier header is required"
            }
            RequestError::Gate(GateError::UnknownApplication(_)) => "invalid app_id",
            RequestError::BodyReadFailure(_) => "failed to read request body",
            RequestError::TransportFailure(_) => "failed to send request to upstream",
            RequestError::UpstreamRejected(_) => "upstream did not return OK",
        }
    }

    /// Short label used to tag metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            RequestError::OriginNotAllowed(_) => "origin_not_allowed",
            RequestError::Gate(GateError::MissingIdentifier) => "missing_identifier",
            RequestError::Gate(GateError::UnknownApplication(_)) => "unknown_application",
            RequestError::BodyReadFailure(_) => "body_read_failure",
            RequestError::TransportFailure(_) => "transport_failure",
            RequestError::UpstreamRejected(_) => "upstream_rejected",
        }
    }
}
