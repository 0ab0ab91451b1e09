//! Gradebook endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::attempts::{self, AttemptMap, AttemptRecord};
use crate::config_tree::GradeConfigTree;
use crate::error::{ApiError, ApiResult, GradeError};
use crate::reducer::reduce;
use crate::view::GradeView;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<f64>,
}

/// GET /api/gradebook/:course_id/:student_key
///
/// Threshold priority: query parameter, course file, service default.
pub async fn get_gradebook(
    State(state): State<AppState>,
    Path((course_id, student_key)): Path<(String, String)>,
    Query(query): Query<ThresholdQuery>,
) -> ApiResult<Json<GradeView>> {
    let course = state.courses.load(&course_id).await?;
    let attempts = attempts::load_attempts(&state.db, &course_id, &student_key).await?;

    let threshold = query
        .threshold
        .or(course.passing_threshold)
        .unwrap_or(state.default_threshold);

    let view = reduce(&course.tree(), &attempts, threshold)?;
    debug!(
        course_id = %course_id,
        student_key = %student_key,
        percentage = view.overall.percentage,
        "Gradebook reduced"
    );
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceRequest {
    pub config: GradeConfigTree,
    #[serde(default)]
    pub attempts: AttemptMap,
    #[serde(default)]
    pub passing_threshold: Option<f64>,
}

/// POST /api/gradebook/reduce
pub async fn reduce_posted(
    State(state): State<AppState>,
    payload: Result<Json<ReduceRequest>, JsonRejection>,
) -> ApiResult<Json<GradeView>> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        // Well-formed JSON that does not fit the tree shape
        JsonRejection::JsonDataError(e) => {
            ApiError::Grade(GradeError::malformed("body", e.body_text()))
        }
        other => ApiError::BadRequest(other.body_text()),
    })?;

    let threshold = request
        .passing_threshold
        .unwrap_or(state.default_threshold);
    Ok(Json(reduce(&request.config, &request.attempts, threshold)?))
}

#[derive(Debug, Deserialize)]
pub struct AttemptBody {
    pub score: f64,
}

/// PUT /api/gradebook/:course_id/:student_key/attempts/:question_id
pub async fn record_attempt(
    State(state): State<AppState>,
    Path((course_id, student_key, question_id)): Path<(String, String, String)>,
    Json(body): Json<AttemptBody>,
) -> ApiResult<Json<AttemptRecord>> {
    let course = state.courses.load(&course_id).await?;
    let known = course
        .categories
        .iter()
        .flat_map(|c| &c.items)
        .flat_map(|i| &i.questions)
        .any(|q| q.id == question_id);
    if !known {
        return Err(ApiError::BadRequest(format!(
            "question {} is not part of course {}",
            question_id, course_id
        )));
    }

    let record =
        attempts::record_attempt(&state.db, &course_id, &student_key, &question_id, body.score)
            .await?;
    Ok(Json(record))
}
