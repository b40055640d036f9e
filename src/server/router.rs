use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers;
use crate::server::ws::ws_handler;
use crate::state::AppState;

/// The thin HTTP surface over the pipeline: health, query, ingestion, unit
/// management, session reset, and a WebSocket for token streaming.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/query", post(handlers::query))
        .route("/api/ingest", post(handlers::ingest))
        .route("/api/ingest/once", post(handlers::ingest_once))
        .route(
            "/api/units",
            get(handlers::list_units).delete(handlers::clear_units),
        )
        .route("/api/units/:unit_id", delete(handlers::delete_unit))
        .route("/api/session", delete(handlers::reset_session))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer() -> CorsLayer {
    let origins = [
        "http://localhost",
        "http://localhost:3000",
        "http://localhost:5173",
        "http://127.0.0.1",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:5173",
    ]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
