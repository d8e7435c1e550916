use crate::config::{AllowedOrigins, ServerSettings};
use http::Method;
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// CORS headers for the tunnel: browsers may only POST from the configured
/// origins and may send the identifier header.
///
/// Preflight requests are answered by the layer itself and never reach the
/// tunnel service.
pub fn cors_layer(settings: &ServerSettings) -> CorsLayer {
    let allow_origin = match &settings.allowed_origins {
        AllowedOrigins::Any => AllowOrigin::any(),
        AllowedOrigins::List(origins) => AllowOrigin::list(origins.iter().cloned()),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT, settings.header_name.clone()])
}
