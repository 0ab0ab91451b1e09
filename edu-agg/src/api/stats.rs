//! Aggregate read and administrative endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::aggregate::{AggregateSnapshot, DriftReport};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub aggregate: String,
    #[serde(flatten)]
    pub snapshot: AggregateSnapshot,
    /// Clamped decrements since startup; non-zero means the counters drifted
    pub underflow_count: u64,
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let snapshot = state
        .maintainer
        .snapshot()
        .await?
        .ok_or_else(|| ApiError::NotFound("aggregate snapshot not computed yet".to_string()))?;

    Ok(Json(StatsResponse {
        aggregate: state.maintainer.aggregate_name().to_string(),
        snapshot,
        underflow_count: state.maintainer.underflow_count(),
    }))
}

/// POST /api/stats/recompute
///
/// Runs on the delivery worker so queued changes are not counted twice.
pub async fn recompute_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<AggregateSnapshot>> {
    Ok(Json(state.feed.request_recompute().await?))
}

/// GET /api/stats/verify
pub async fn verify_stats(State(state): State<AppState>) -> ApiResult<Json<DriftReport>> {
    Ok(Json(state.maintainer.verify().await?))
}
