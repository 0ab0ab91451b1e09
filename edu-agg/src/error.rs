//! Error types for edu-agg

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Storage backend failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Backend unreachable or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be interpreted
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),

    /// Write refused before touching storage (e.g. blank status)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Aggregate maintenance failure
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The delta path failed and the single fallback recompute failed too.
    /// Surfaced so the change delivery system can apply its own retry policy.
    #[error("Aggregate write failed for entity {entity_id}: {source}")]
    WriteFailure {
        entity_id: String,
        #[source]
        source: StoreError,
    },

    /// The change triple itself cannot be counted
    #[error("Invalid change for entity {entity_id}: {reason}")]
    InvalidChange { entity_id: String, reason: String },
}

impl AggregateError {
    /// Whether delivering the same change again can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AggregateError::InvalidChange { .. })
    }
}

/// Change feed failure seen by publishers and recompute requesters
#[derive(Debug, Error)]
pub enum FeedError {
    /// The delivery worker is gone
    #[error("change feed closed")]
    Closed,

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Service cannot accept work right now (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::Closed => ApiError::Unavailable("change feed closed".to_string()),
            FeedError::Aggregate(e) => ApiError::Aggregate(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_)
            | ApiError::Store(StoreError::InvalidRecord(_))
            | ApiError::Aggregate(AggregateError::InvalidChange { .. }) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Aggregate(AggregateError::WriteFailure { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILURE")
            }
            ApiError::Aggregate(_) | ApiError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
