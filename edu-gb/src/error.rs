//! Error types for edu-gb

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Gradebook computation and lookup errors
///
/// Reducer errors are never replaced with a fallback view.
#[derive(Debug, Error)]
pub enum GradeError {
    /// Config tree is structurally invalid (negative points, missing field, ...)
    #[error("Malformed grade config at {path}: {reason}")]
    ConfigMalformed { path: String, reason: String },

    #[error("Malformed attempt record for question {question_id}: {reason}")]
    AttemptMalformed { question_id: String, reason: String },

    #[error("Passing threshold {0} is outside 0..=100")]
    InvalidThreshold(f64),

    #[error("Course not found: {0}")]
    CourseNotFound(String),

    #[error(transparent)]
    Common(#[from] edu_common::Error),
}

impl GradeError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        GradeError::ConfigMalformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for GradeError {
    fn from(err: sqlx::Error) -> Self {
        GradeError::Common(edu_common::Error::Database(err))
    }
}

/// API error type rendered as `{"error": {"code", "message"}}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Grade(#[from] GradeError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Grade(GradeError::ConfigMalformed { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CONFIG_MALFORMED")
            }
            ApiError::Grade(GradeError::AttemptMalformed { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ATTEMPT_MALFORMED")
            }
            ApiError::Grade(GradeError::InvalidThreshold(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_THRESHOLD")
            }
            ApiError::Grade(GradeError::CourseNotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Grade(GradeError::Common(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
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
