//! Error types for the store and pass-service boundary.
//!
//! The refresh core itself never fails; these cover loading and persisting
//! album state and reading change batches.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("asset change batch is empty")]
    EmptyChangeData,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid album subtype: {0}")]
    InvalidSubtype(i32),
}

pub type Result<T> = std::result::Result<T, RefreshError>;
