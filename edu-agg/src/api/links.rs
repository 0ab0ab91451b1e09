//! Registry link reconciliation trigger

use axum::{extract::State, Json};

use crate::reconcile::ReconcileReport;
use crate::AppState;

/// POST /api/links/reconcile
pub async fn reconcile_links(State(state): State<AppState>) -> Json<ReconcileReport> {
    Json(state.reconciler.run().await)
}
