pub mod session;
pub mod ui;

use std::sync::Arc;

use axum::{http::HeaderValue, middleware as axum_mw, routing::get, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::middleware;
use crate::state::AppState;

fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = if config.cors_origin == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Full application: session-scoped page routes plus the health check.
pub fn build_app(state: Arc<AppState>) -> Router {
    let session_routes = ui::router()
        .merge(session::router())
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::session::resolve_session,
        ));

    Router::new()
        .merge(session_routes)
        .route("/health", get(session::health))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
