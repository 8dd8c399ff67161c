//! Flag state persistence.
//!
//! A [`FlagStore`] holds two kinds of record for one namespace: the global
//! set of published flag keys, and one set of previewed flag keys per user.
//! Every record carries a version so that writers can detect concurrent
//! modification: a `put_*` call succeeds only if the record is still at the
//! version the caller read, otherwise it fails with [`StoreError::Conflict`].
//!
//! Versions never go backwards within a namespace, not even across
//! [`FlagStore::clear`]: records absent after a clear read at a version above
//! any they held before, so a write based on a read taken before the clear
//! conflicts.

mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use file::FileFlagStore;
pub use memory::MemoryFlagStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisFlagStore;

use crate::viewer::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// A set of flag keys.
pub type FlagSet = BTreeSet<String>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Version of a record that has never been written.
pub const UNINITIALIZED: u64 = 0;

/// A stored value together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }

    /// Whether the record has ever been written, or the namespace cleared.
    pub fn is_initialized(&self) -> bool {
        self.version != UNINITIALIZED
    }
}

/// Store backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since it was read.
    #[error("Version conflict: expected {expected}, found {actual}")]
    Conflict { expected: u64, actual: u64 },

    /// The operation did not finish in time.
    #[error("Operation timeout")]
    Timeout,

    /// Backend could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

impl StoreError {
    /// Transient failures worth retrying. Corrupt data is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StoreError::Serialization(_))
    }
}

/// Persistence for published and preview flag sets.
#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Read the global published set. An absent record reads as an empty set
    /// at [`UNINITIALIZED`], or at the namespace floor once it has been
    /// cleared.
    async fn get_published(&self) -> StoreResult<Versioned<FlagSet>>;

    /// Replace the published set if it is still at `expected_version`.
    ///
    /// Returns the new version.
    async fn put_published(&self, flags: &FlagSet, expected_version: u64) -> StoreResult<u64>;

    /// Read the preview set of one user.
    async fn get_preview(&self, user: UserId) -> StoreResult<Versioned<FlagSet>>;

    /// Replace the preview set of one user if it is still at
    /// `expected_version`.
    async fn put_preview(
        &self,
        user: UserId,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64>;

    /// Delete every record in the namespace.
    ///
    /// The namespace keeps a version floor above every version it handed
    /// out, so writes against earlier reads are rejected.
    ///
    /// **Warning:** this discards all published and preview state.
    async fn clear(&self) -> StoreResult<()>;
}

/// Record name of the published set within a namespace.
pub fn published_record(namespace: &str) -> String {
    format!("{}_published_flags", namespace)
}

/// Record name of the version floor a namespace keeps across clears.
pub fn floor_record(namespace: &str) -> String {
    format!("{}_version_floor", namespace)
}

/// Record name of a user's preview set within a namespace.
pub fn preview_record(namespace: &str, user: UserId) -> String {
    format!("{}_previewing_flags:{}", namespace, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_names() {
        let user = UserId::new(7).unwrap();
        assert_eq!(published_record("site"), "site_published_flags");
        assert_eq!(preview_record("site", user), "site_previewing_flags:7");
        assert_eq!(floor_record("site"), "site_version_floor");
    }

    #[test]
    fn test_uninitialized_default() {
        let record: Versioned<FlagSet> = Versioned::default();
        assert!(!record.is_initialized());
        assert!(record.value.is_empty());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StoreError::Timeout.is_retryable());
        assert!(StoreError::Conflict { expected: 1, actual: 2 }.is_retryable());

        let bad_json = serde_json::from_str::<FlagSet>("{").unwrap_err();
        assert!(!StoreError::from(bad_json).is_retryable());
    }
}
