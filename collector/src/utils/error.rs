use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::services::plan_tracer::parser::ParseError;

/// Collector error with rich context and automatic error trait implementations
///
/// Each variant carries enough context to log it without the surrounding call.
#[derive(Error, Debug)]
pub enum TracerError {
    // Wire errors 1xxx
    #[error("Failed to decode probe event: {0}")]
    WireDecode(#[from] ParseError),

    // Query errors 2xxx
    #[error("Query for pid {pid} not found")]
    QueryNotFound { pid: i32 },

    // Transport errors 3xxx
    #[error("Agent transport error: {0}")]
    Transport(String),

    #[error("Metadata lookup failed: {0}")]
    Metadata(String),

    #[error("Script generation failed: {0}")]
    ScriptGeneration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // System errors 5xxx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TracerError {
    pub fn query_not_found(pid: i32) -> Self {
        Self::QueryNotFound { pid }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    pub fn script_generation(message: impl Into<String>) -> Self {
        Self::ScriptGeneration(message.into())
    }

    pub fn error_code(&self) -> i32 {
        match self {
            // Wire errors 1xxx
            Self::WireDecode(_) => 1001,

            // Query errors 2xxx
            Self::QueryNotFound { .. } => 2001,

            // Transport errors 3xxx
            Self::Transport(_) => 3001,
            Self::Metadata(_) => 3002,
            Self::ScriptGeneration(_) => 3003,
            Self::Http(_) => 3004,

            // System errors 5xxx
            Self::Database(_) => 5002,
            Self::Other(_) => 5001,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: i32,
    pub message: String,
}

impl IntoResponse for TracerError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = match code {
            1001..=1999 => StatusCode::BAD_REQUEST,
            2001..=2999 => StatusCode::NOT_FOUND,
            3001..=3999 => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = ErrorResponse { code, message: self.to_string() };

        (status, Json(response)).into_response()
    }
}

impl From<serde_json::Error> for TracerError {
    fn from(err: serde_json::Error) -> Self {
        TracerError::Other(anyhow::anyhow!("JSON serialization error: {}", err))
    }
}

pub type TracerResult<T> = Result<T, TracerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_by_range() {
        assert_eq!(TracerError::from(ParseError::InvalidUtf8).error_code(), 1001);
        assert_eq!(TracerError::query_not_found(7).error_code(), 2001);
        assert_eq!(TracerError::transport("refused").error_code(), 3001);
        assert_eq!(TracerError::from(anyhow::anyhow!("boom")).error_code(), 5001);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = TracerError::query_not_found(96700).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
