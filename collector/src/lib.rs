pub mod config;
pub mod handlers;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::services::{PlanBroadcaster, QueryRegistry};

/// Shared state behind the observer API
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<QueryRegistry>,
    pub broadcaster: Arc<PlanBroadcaster>,
}

impl AppState {
    pub fn new(registry: Arc<QueryRegistry>, broadcaster: Arc<PlanBroadcaster>) -> Self {
        Self { registry, broadcaster }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::query::health))
        .route("/api/queries", get(handlers::query::list_queries))
        .route("/api/queries/stream", get(handlers::query::stream_queries))
        .route("/api/queries/:pid", get(handlers::query::get_query))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
