//! In-process flag store.

use super::{FlagSet, FlagStore, StoreError, StoreResult, Versioned};
use crate::viewer::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Records {
    published: Option<Versioned<FlagSet>>,
    previews: HashMap<UserId, Versioned<FlagSet>>,
    /// Version absent records read at.
    floor: u64,
}

impl Records {
    fn absent(&self) -> Versioned<FlagSet> {
        Versioned::new(FlagSet::new(), self.floor)
    }

    fn highest_version(&self) -> u64 {
        self.published
            .iter()
            .chain(self.previews.values())
            .map(|record| record.version)
            .fold(self.floor, u64::max)
    }
}

/// Flag store kept in memory. Clones share the same records.
///
/// Suitable for tests and single-process deployments that do not need
/// state to survive a restart.
#[derive(Clone, Default)]
pub struct MemoryFlagStore {
    records: Arc<RwLock<Records>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a preview record.
    pub async fn preview_user_count(&self) -> usize {
        self.records.read().await.previews.len()
    }
}

fn compare_and_swap(
    record: &mut Versioned<FlagSet>,
    flags: &FlagSet,
    expected_version: u64,
) -> StoreResult<u64> {
    if record.version != expected_version {
        return Err(StoreError::Conflict {
            expected: expected_version,
            actual: record.version,
        });
    }

    record.value = flags.clone();
    record.version += 1;
    Ok(record.version)
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn get_published(&self) -> StoreResult<Versioned<FlagSet>> {
        let records = self.records.read().await;
        Ok(records.published.clone().unwrap_or_else(|| records.absent()))
    }

    async fn put_published(&self, flags: &FlagSet, expected_version: u64) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let absent = records.absent();
        let record = records.published.get_or_insert(absent);
        compare_and_swap(record, flags, expected_version)
    }

    async fn get_preview(&self, user: UserId) -> StoreResult<Versioned<FlagSet>> {
        let records = self.records.read().await;
        Ok(records
            .previews
            .get(&user)
            .cloned()
            .unwrap_or_else(|| records.absent()))
    }

    async fn put_preview(
        &self,
        user: UserId,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let mut records = self.records.write().await;
        let absent = records.absent();
        let record = records.previews.entry(user).or_insert(absent);
        compare_and_swap(record, flags, expected_version)
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let floor = records.highest_version() + 1;
        *records = Records {
            floor,
            ..Records::default()
        };
        Ok(())
    }
}
