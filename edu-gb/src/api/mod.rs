//! HTTP API handlers for edu-gb

pub mod gradebook;
pub mod health;

pub use gradebook::{get_gradebook, record_attempt, reduce_posted};
pub use health::health_routes;
