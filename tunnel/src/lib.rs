//! Multi-tenant ingress tunnel for Sentry envelopes.
//!
//! Client applications POST envelopes to a single route and identify
//! themselves with a header. The identifier selects the upstream project
//! credentials, and the envelope is relayed byte-for-byte to that project's
//! envelope endpoint.

pub mod config;
pub mod cors;
pub mod errors;
pub mod forwarder;
pub mod gate;
pub mod metrics_defs;
pub mod service;

#[cfg(test)]
mod testutils;

use crate::config::Config;
use crate::cors::cors_layer;
use crate::errors::TunnelError;
use crate::forwarder::{ReqwestTransport, UpstreamForwarder};
use crate::service::TunnelService;
use hyper_util::service::TowerToHyperService;
use shared::http::run_http_service;
use std::sync::Arc;
use tower::ServiceBuilder;

/// Serves the tunnel until the listener fails.
///
/// The config is shared read-only by every request for the lifetime of the server.
pub async fn run(config: Config) -> Result<(), TunnelError> {
    let config = Arc::new(config);

    let transport = ReqwestTransport::new(config.upstream.timeout)?;
    let forwarder = UpstreamForwarder::new(Arc::new(transport));

    let service = ServiceBuilder::new()
        .layer(cors_layer(&config.server))
        .service(TunnelService::new(config.clone(), forwarder));

    tracing::info!(
        route = %config.server.route,
        header = %config.server.header_name,
        projects = config.projects.len(),
        "starting tunnel"
    );

    run_http_service(
        &config.server.host,
        config.server.port,
        TowerToHyperService::new(service),
    )
    .await
}
