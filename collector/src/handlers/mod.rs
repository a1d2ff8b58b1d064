pub mod query;

use axum::Json;
use utoipa::OpenApi;

use crate::services::plan_tracer::models::{
    BufferUsage, InstrumentCategory, InstrumentationConfig, NodeMetrics, PlanMessage,
    PlanNodeSnapshot, QuerySnapshot, QueryStatus, Relationship,
};
use crate::utils::error::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(title = "plantap collector", description = "Live query plan traces"),
    paths(query::health, query::list_queries, query::get_query, query::stream_queries),
    components(schemas(
        query::HealthResponse,
        QuerySnapshot,
        PlanNodeSnapshot,
        PlanMessage,
        NodeMetrics,
        BufferUsage,
        Relationship,
        QueryStatus,
        InstrumentCategory,
        InstrumentationConfig,
        ErrorResponse
    )),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Queries", description = "Traced queries and their plan trees")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
