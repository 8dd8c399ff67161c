//! Error types for flag queries and mutations.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, FlagError>;

/// Registry-level errors.
#[derive(Debug, Error)]
pub enum FlagError {
    /// The key is not in the catalog.
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    /// The key is not a syntactically valid flag identifier.
    #[error("Invalid flag key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// The persistence backend failed or timed out. State is unchanged.
    #[error("Flag store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl FlagError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlagError::StoreUnavailable(e) => e.is_retryable(),
            _ => false,
        }
    }
}
