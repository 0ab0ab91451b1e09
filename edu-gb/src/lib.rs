//! edu-gb library - gradebook service
//!
//! Reduces a course's grade config tree and a student's attempt records
//! into a gradebook view on every read.

use axum::Router;
use sqlx::SqlitePool;

pub mod api;
pub mod attempts;
pub mod config_tree;
pub mod courses;
pub mod error;
pub mod reducer;
pub mod view;

pub use crate::error::{ApiError, ApiResult, GradeError};
pub use crate::reducer::reduce;

use crate::courses::CourseCatalog;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub courses: CourseCatalog,
    /// Used when neither the request nor the course file sets a threshold
    pub default_threshold: f64,
}

impl AppState {
    pub fn new(db: SqlitePool, courses: CourseCatalog, default_threshold: f64) -> Self {
        Self {
            db,
            courses,
            default_threshold,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let api = Router::new()
        .route("/api/gradebook/reduce", post(api::reduce_posted))
        .route(
            "/api/gradebook/:course_id/:student_key",
            get(api::get_gradebook),
        )
        .route(
            "/api/gradebook/:course_id/:student_key/attempts/:question_id",
            put(api::record_attempt),
        );

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
