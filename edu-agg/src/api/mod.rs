//! HTTP API handlers for edu-agg

pub mod changes;
pub mod families;
pub mod health;
pub mod links;
pub mod sse;
pub mod stats;

pub use changes::submit_change;
pub use families::{delete_family, get_family, put_family};
pub use health::health_routes;
pub use links::reconcile_links;
pub use sse::event_stream;
pub use stats::{get_stats, recompute_stats, verify_stats};
