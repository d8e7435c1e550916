use crate::config::Project;
use crate::metrics_defs::ENVELOPES_FORWARDED;
use async_trait::async_trait;
use http::StatusCode;
use hyper::body::Bytes;
use shared::counter;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not build upstream url: {0}")]
    InvalidUrl(String),

    #[error("upstream connection failed: {0}")]
    Connect(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        // The url carries the project key, keep it out of the message
        let error = error.without_url();

        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Request(message)
        }
    }
}

/// Outbound HTTP used to deliver envelopes.
///
/// Implementations must be safe to share between concurrent requests. The
/// returned status is all the forwarder needs; the response body must be
/// released before returning.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_envelope(&self, url: Url, body: Bytes) -> Result<StatusCode, TransportError>;
}

/// Pooled transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// `timeout` covers the whole exchange, from connecting to draining the response body.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send_envelope(&self, url: Url, body: Bytes) -> Result<StatusCode, TransportError> {
        let response = self.client.post(url).body(body).send().await?;
        let status = response.status();

        // Drain the body so the connection can go back to the pool. Its
        // content is never forwarded, so a failure here does not matter.
        if let Err(error) = response.bytes().await {
            tracing::debug!(error = %TransportError::from(error), "failed to drain upstream response");
        }

        Ok(status)
    }
}

/// Result of relaying one envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The upstream answered 200.
    Accepted,
    /// The upstream answered with any other status.
    UpstreamRejected(StatusCode),
    /// No response was received from the upstream.
    TransportFailure(TransportError),
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::UpstreamRejected(_) => "rejected",
            Outcome::TransportFailure(_) => "failed",
        }
    }
}

/// Relays envelopes to the project's upstream. Holds no per-request state.
#[derive(Clone)]
pub struct UpstreamForwarder {
    transport: Arc<dyn Transport>,
}

impl UpstreamForwarder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends `body` unmodified to the project's envelope endpoint. Never retries.
    pub async fn forward(&self, project: &Project, body: Bytes, base_url: &Url) -> Outcome {
        let outcome = match envelope_url(base_url, project) {
            Ok(url) => match self.transport.send_envelope(url, body).await {
                Ok(StatusCode::OK) => Outcome::Accepted,
                Ok(status) => Outcome::UpstreamRejected(status),
                Err(error) => Outcome::TransportFailure(error),
            },
            Err(error) => Outcome::TransportFailure(error),
        };

        match &outcome {
            Outcome::Accepted => tracing::debug!(app_id = %project.id, "envelope accepted"),
            Outcome::UpstreamRejected(status) => {
                tracing::warn!(app_id = %project.id, status = %status, "upstream rejected envelope")
            }
            Outcome::TransportFailure(error) => {
                tracing::error!(app_id = %project.id, error = %error, "failed to send envelope upstream")
            }
        }
        counter!(ENVELOPES_FORWARDED, "outcome" => outcome.as_str()).increment(1);

        outcome
    }
}

/// Builds `{base_url}/api/{upstream_project_id}/envelope/?sentry_key={upstream_key}`.
///
/// Any path on the base URL is kept as a prefix.
pub fn envelope_url(base_url: &Url, project: &Project) -> Result<Url, TransportError> {
    let mut url = base_url.clone();

    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUrl("base url cannot have a path".into()))?
        .pop_if_empty()
        .extend(["api", project.upstream_project_id.as_str(), "envelope", ""]);

    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("sentry_key", &project.upstream_key);

    Ok(url)
}
