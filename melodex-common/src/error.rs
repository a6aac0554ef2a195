//! Common error types, shared between the engine crate and its HTTP adapter.
//!
//! Mirrors the taxonomy in spec §7: `NotFound`, `Conflict`, `InvalidArgument`,
//! `DatabaseLocked`, `Internal` each surface at a distinct HTTP status at the
//! boundary (see `melodex::error::ApiError`).

use thiserror::Error;

/// Common result type for melodex operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the catalog, scanning, and matching layers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database locked: {0}")]
    DatabaseLocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when this is a transient SQLite lock contention error that a
    /// caller may retry (see `melodex::db::retry::retry_on_lock`).
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(e) => e.to_string().contains("database is locked"),
            Error::DatabaseLocked(_) => true,
            _ => false,
        }
    }
}
