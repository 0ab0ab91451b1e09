//! Family collection endpoints (writes go through change capture)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::aggregate::Dimensions;
use crate::error::{ApiError, ApiResult};
use crate::families::FamilyRecord;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyBody {
    pub status: String,
    #[serde(default)]
    pub facilitator_key: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// GET /api/families/:id
pub async fn get_family(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
) -> ApiResult<Json<FamilyRecord>> {
    state
        .families
        .get(&family_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("family {}", family_id)))
}

/// PUT /api/families/:id
pub async fn put_family(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    Json(body): Json<FamilyBody>,
) -> ApiResult<Json<FamilyRecord>> {
    let dims = Dimensions::new(body.status.trim(), body.facilitator_key.as_deref());
    if !dims.is_valid() {
        return Err(ApiError::BadRequest("status must not be empty".to_string()));
    }
    let data = body.data.unwrap_or_else(|| serde_json::json!({}));

    Ok(Json(state.families.upsert(&family_id, &dims, &data).await?))
}

/// DELETE /api/families/:id
pub async fn delete_family(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.families.delete(&family_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("family {}", family_id)))
    }
}
