//! # EDU Common Library
//!
//! Shared code for the EDU services including:
//! - Database initialization and schema
//! - Event types (EduEvent enum) and the event bus
//! - Configuration loading and root folder resolution
//! - Tracing setup
//! - SSE and timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
