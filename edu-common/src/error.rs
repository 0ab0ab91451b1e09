//! Shared error type for EDU service startup and infrastructure

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures in the shared infrastructure (database, files, config, tracing)
///
/// Service crates wrap this in their own error enums; `main` turns it into
/// an `anyhow` error.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool creation, schema setup or a query against `edu.db`
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Root folder creation, log file or course file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap TOML could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Process-level setup that cannot be retried (e.g. a second tracing init)
    #[error("Internal error: {0}")]
    Internal(String),
}
