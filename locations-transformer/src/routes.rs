//! Route definitions for the Locations Transformer.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::state::AppState;

/// Path under which locations are served.
pub const LOCATIONS_PATH: &str = "/transformers/locations";

/// Creates the Axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let locations = Router::new()
        .route("/__count", get(handlers::get_count))
        .route("/__ids", get(handlers::get_ids))
        .route(
            "/__reload",
            post(handlers::trigger_reload).delete(handlers::cancel_reload),
        )
        .route("/{uuid}", get(handlers::get_location_by_uuid));

    Router::new()
        .route(LOCATIONS_PATH, get(handlers::get_locations))
        .nest(LOCATIONS_PATH, locations)
        .route("/__health", get(handlers::health))
        .route("/__gtg", get(handlers::gtg))
        .route("/__ping", get(handlers::ping))
        .route("/__build-info", get(handlers::build_info))
        .route("/metrics", get(handlers::metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
