//! Error types for filedepot.

use thiserror::Error;

/// Common error type for filedepot.
#[derive(Error, Debug)]
pub enum DepotError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A feature switched off by configuration was requested.
    #[error("feature disabled: {0}")]
    FeatureDisabled(String),

    /// Too many requests for the same resource.
    #[error("rate limited, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window reopens.
        retry_after_secs: u64,
    },

    /// Download token has a bad signature or has expired.
    #[error("download token is invalid or expired")]
    TokenInvalid,

    /// Download token was issued for a different file.
    #[error("download token does not match the requested file")]
    TokenFileMismatch,

    /// Download token was already redeemed.
    #[error("download token has already been used")]
    TokenAlreadyUsed,

    /// Another request already claimed the merge of this upload session.
    #[error("merge already in progress for upload {0}")]
    MergeInProgress(String),

    /// Chunks are missing at merge time.
    #[error("upload is incomplete, missing chunks {missing:?}")]
    IncompleteUpload {
        /// Indices with no stored chunk.
        missing: Vec<u32>,
    },
}

impl From<sqlx::Error> for DepotError {
    fn from(e: sqlx::Error) -> Self {
        DepotError::Database(e.to_string())
    }
}

/// Result type alias for filedepot operations.
pub type Result<T> = std::result::Result<T, DepotError>;
