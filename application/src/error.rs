use std::io;
use thiserror::Error;

use domain::error::DomainError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Tile unavailable: {message}")]
    TileUnavailable { message: String },

    #[error("Codec error: {message}")]
    CodecError { message: String },

    #[error("Database busy: {message}")]
    DatabaseBusy { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Project source error: {message}")]
    ProjectSourceError { message: String },
}

impl AppError {
    /// Transient store contention that the caller may retry once before
    /// surfacing.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseBusy { .. })
    }
}

pub type AppResult<T> = Result<T, AppError>;
