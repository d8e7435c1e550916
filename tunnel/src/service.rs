use crate::config::Config;
use crate::errors::{RequestError, TunnelError};
use crate::forwarder::{Outcome, UpstreamForwarder};
use crate::gate;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT, REQUESTS_REJECTED};
use http::header::ORIGIN;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Bytes};
use shared::http::{make_empty_response, make_error_response, make_json_response};
use shared::{counter, gauge, histogram};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

pub const HEALTH_PATH: &str = "/health";

pub type TunnelBody = BoxBody<Bytes, TunnelError>;

/// Serves the health endpoint and the tunnel route.
///
/// Cloning is cheap; every clone shares the same config and outbound transport.
#[derive(Clone)]
pub struct TunnelService {
    config: Arc<Config>,
    forwarder: UpstreamForwarder,
}

impl TunnelService {
    pub fn new(config: Arc<Config>, forwarder: UpstreamForwarder) -> Self {
        Self { config, forwarder }
    }

    async fn handle<B>(self, request: Request<B>) -> Response<TunnelBody>
    where
        B: Body,
        B::Error: Display,
    {
        let path = request.uri().path();

        if request.method() == Method::GET && path == HEALTH_PATH {
            return make_json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }));
        }
        if path != self.config.server.route {
            return make_error_response(StatusCode::NOT_FOUND, "not found");
        }
        if request.method() != Method::POST {
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        let _inflight = InflightGuard::new();
        let started = Instant::now();

        let response = match self.tunnel(request).await {
            Ok(()) => make_empty_response(StatusCode::OK),
            Err(error) => {
                // Upstream failures are logged by the forwarder
                if !matches!(
                    error,
                    RequestError::TransportFailure(_) | RequestError::UpstreamRejected(_)
                ) {
                    tracing::info!(reason = error.reason(), error = %error, "tunnel request rejected");
                }
                counter!(REQUESTS_REJECTED, "reason" => error.reason()).increment(1);
                make_error_response(error.status(), error.public_message())
            }
        };

        histogram!(REQUEST_DURATION, "status" => response.status().as_str().to_owned())
            .record(started.elapsed().as_secs_f64());

        response
    }

    /// Origin check, gate, body read, then the upstream call.
    async fn tunnel<B>(&self, request: Request<B>) -> Result<(), RequestError>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = request.into_parts();

        if let Some(origin) = parts.headers.get(ORIGIN)
            && !self.config.server.allowed_origins.allows(origin)
        {
            return Err(RequestError::OriginNotAllowed(
                String::from_utf8_lossy(origin.as_bytes()).into(),
            ));
        }

        let project = gate::admit(
            parts.headers.get(&self.config.server.header_name),
            &self.config,
        )?;

        let body = body
            .collect()
            .await
            .map_err(|e| RequestError::BodyReadFailure(e.to_string()))?
            .to_bytes();

        match self
            .forwarder
            .forward(project, body, &self.config.upstream.base_url)
            .await
        {
            Outcome::Accepted => Ok(()),
            Outcome::UpstreamRejected(status) => Err(RequestError::UpstreamRejected(status)),
            Outcome::TransportFailure(error) => Err(RequestError::TransportFailure(error)),
        }
    }
}

impl<B> tower::Service<Request<B>> for TunnelService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    type Response = Response<TunnelBody>;
    type Error = TunnelError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(request).await) })
    }
}

/// Tracks a request in the inflight gauge, including requests dropped mid-flight.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}
