//! Change notification intake for external change-capture triggers

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::delivery::EntityChangeEvent;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/changes
///
/// Queues the triple for the delivery worker and returns 202.
pub async fn submit_change(
    State(state): State<AppState>,
    Json(event): Json<EntityChangeEvent>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if event.entity_id.trim().is_empty() {
        return Err(ApiError::BadRequest("entityId must not be empty".to_string()));
    }
    for dims in [&event.before, &event.after].into_iter().flatten() {
        if !dims.is_valid() {
            return Err(ApiError::BadRequest("status must not be empty".to_string()));
        }
    }

    let entity_id = event.entity_id.clone();
    state.feed.publish(event).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "entityId": entity_id })),
    ))
}
