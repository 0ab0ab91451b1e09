//! edu-agg library - aggregate maintenance service
//!
//! Keeps the family statistics snapshot consistent with the family
//! collection and reconciles registry link tables.

use axum::Router;
use edu_common::events::EventBus;
use std::sync::Arc;

pub mod aggregate;
pub mod api;
pub mod delivery;
pub mod error;
pub mod families;
pub mod reconcile;
pub mod scheduler;
pub mod store;

pub use crate::error::{AggregateError, ApiError, ApiResult, StoreError};

use crate::aggregate::AggregateMaintainer;
use crate::delivery::ChangeFeed;
use crate::families::FamilyRepository;
use crate::reconcile::LinkReconciler;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub maintainer: Arc<AggregateMaintainer>,
    pub families: Arc<FamilyRepository>,
    pub feed: ChangeFeed,
    pub reconciler: Arc<LinkReconciler>,
    pub event_bus: EventBus,
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let api = Router::new()
        .route("/api/stats", get(api::get_stats))
        .route("/api/stats/recompute", post(api::recompute_stats))
        .route("/api/stats/verify", get(api::verify_stats))
        .route("/api/changes", post(api::submit_change))
        .route(
            "/api/families/:id",
            put(api::put_family)
                .get(api::get_family)
                .delete(api::delete_family),
        )
        .route("/api/links/reconcile", post(api::reconcile_links))
        .route("/api/events", get(api::event_stream));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
