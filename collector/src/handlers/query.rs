use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use utoipa::{IntoParams, ToSchema};

use crate::AppState;
use crate::services::plan_tracer::models::QuerySnapshot;
use crate::utils::error::ErrorResponse;
use crate::utils::{TracerError, TracerResult};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// Queries currently being traced
    pub queries: usize,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamParams {
    /// Only forward snapshots of this pid
    pub pid: Option<i32>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Collector is up", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), queries: state.registry.len() })
}

// Snapshots of every traced query, without plan trees
#[utoipa::path(
    get,
    path = "/api/queries",
    responses(
        (status = 200, description = "Traced queries ordered by pid", body = Vec<QuerySnapshot>)
    ),
    tag = "Queries"
)]
pub async fn list_queries(State(state): State<Arc<AppState>>) -> TracerResult<Json<Vec<QuerySnapshot>>> {
    let queries = state.registry.snapshots(false);
    tracing::debug!("Listing {} traced queries", queries.len());
    Ok(Json(queries))
}

#[utoipa::path(
    get,
    path = "/api/queries/{pid}",
    params(
        ("pid" = i32, Path, description = "Backend process id")
    ),
    responses(
        (status = 200, description = "Query snapshot with its plan tree", body = QuerySnapshot),
        (status = 404, description = "Query not traced", body = ErrorResponse)
    ),
    tag = "Queries"
)]
pub async fn get_query(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i32>,
) -> TracerResult<Json<QuerySnapshot>> {
    let query = state.registry.get(pid).ok_or_else(|| TracerError::query_not_found(pid))?;
    Ok(Json(query.snapshot(true)))
}

// Live plan snapshots as Server-Sent Events named "plan"
#[utoipa::path(
    get,
    path = "/api/queries/stream",
    params(StreamParams),
    responses(
        (status = 200, description = "text/event-stream of PlanMessage payloads", content_type = "text/event-stream")
    ),
    tag = "Queries"
)]
pub async fn stream_queries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = params.pid;
    tracing::debug!(pid = ?filter, "Observer subscribed to plan stream");

    let stream = BroadcastStream::new(state.broadcaster.subscribe()).filter_map(move |message| {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Plan stream observer fell behind: {}", e);
                return None;
            },
        };
        if filter.is_some_and(|pid| pid != message.query.pid) {
            return None;
        }
        match Event::default().event("plan").json_data(&message) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!(pid = message.query.pid, "Failed to encode plan event: {}", e);
                None
            },
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
