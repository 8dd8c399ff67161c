//! JSON file flag store.

use super::{FlagSet, FlagStore, StoreError, StoreResult, Versioned};
use crate::viewer::UserId;
use async_trait::async_trait;
use flagpost_log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Records of one namespace as laid out on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
struct NamespaceDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    published: Option<Versioned<FlagSet>>,
    #[serde(default)]
    previews: BTreeMap<UserId, Versioned<FlagSet>>,
    /// Version absent records read at, raised by each clear.
    #[serde(default)]
    floor: u64,
}

impl NamespaceDocument {
    fn absent(&self) -> Versioned<FlagSet> {
        Versioned::new(FlagSet::new(), self.floor)
    }

    fn clear(&mut self) {
        let highest = self
            .published
            .iter()
            .chain(self.previews.values())
            .map(|record| record.version)
            .fold(self.floor, u64::max);
        *self = NamespaceDocument {
            floor: highest + 1,
            ..NamespaceDocument::default()
        };
    }
}

type Document = BTreeMap<String, NamespaceDocument>;

/// Flag store persisted as a single JSON document.
///
/// Several namespaces may share one file. Writes go to a temporary sibling
/// file which is then renamed over the original, so readers never observe a
/// partial document. Writers are serialized within this process only; use a
/// shared backend when several processes toggle flags.
#[derive(Clone)]
pub struct FileFlagStore {
    path: Arc<PathBuf>,
    namespace: Arc<str>,
    lock: Arc<Mutex<()>>,
}

impl FileFlagStore {
    /// Create a store for `namespace` backed by the file at `path`. The file
    /// is created on first write.
    pub fn new(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            path: Arc::new(path.into()),
            namespace: Arc::from(namespace.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> StoreResult<Document> {
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(bytes) if bytes.is_empty() => Ok(Document::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_document(&self, document: &Document) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, self.path.as_ref()).await?;

        debug!(target: "flagpost::store", "wrote {}", self.path.display());
        Ok(())
    }

    async fn swap<F>(&self, expected_version: u64, flags: &FlagSet, select: F) -> StoreResult<u64>
    where
        F: FnOnce(&mut NamespaceDocument) -> &mut Versioned<FlagSet>,
    {
        let _guard = self.lock.lock().await;

        let mut document = self.read_document().await?;
        let namespace = document.entry(self.namespace.to_string()).or_default();
        let record = select(namespace);

        if record.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                actual: record.version,
            });
        }

        record.value = flags.clone();
        record.version += 1;
        let version = record.version;

        self.write_document(&document).await?;
        Ok(version)
    }
}

#[async_trait]
impl FlagStore for FileFlagStore {
    async fn get_published(&self) -> StoreResult<Versioned<FlagSet>> {
        let document = self.read_document().await?;
        Ok(document
            .get(self.namespace.as_ref())
            .map(|ns| ns.published.clone().unwrap_or_else(|| ns.absent()))
            .unwrap_or_default())
    }

    async fn put_published(&self, flags: &FlagSet, expected_version: u64) -> StoreResult<u64> {
        self.swap(expected_version, flags, |ns| {
            let absent = ns.absent();
            ns.published.get_or_insert(absent)
        })
        .await
    }

    async fn get_preview(&self, user: UserId) -> StoreResult<Versioned<FlagSet>> {
        let document = self.read_document().await?;
        Ok(document
            .get(self.namespace.as_ref())
            .map(|ns| ns.previews.get(&user).cloned().unwrap_or_else(|| ns.absent()))
            .unwrap_or_default())
    }

    async fn put_preview(
        &self,
        user: UserId,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64> {
        self.swap(expected_version, flags, |ns| {
            let absent = ns.absent();
            ns.previews.entry(user).or_insert(absent)
        })
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        let _guard = self.lock.lock().await;

        let mut document = self.read_document().await?;
        document
            .entry(self.namespace.to_string())
            .or_default()
            .clear();
        self.write_document(&document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> FlagSet {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlagStore::new(dir.path().join("flags.json"), "site");

        let published = store.get_published().await.unwrap();
        assert!(!published.is_initialized());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/flags.json");
        let user = UserId::new(5).unwrap();

        let store = FileFlagStore::new(&path, "site");
        store.put_published(&set(&["a"]), 0).await.unwrap();
        store.put_preview(user, &set(&["b"]), 0).await.unwrap();

        let reopened = FileFlagStore::new(&path, "site");
        assert_eq!(reopened.get_published().await.unwrap().value, set(&["a"]));
        assert_eq!(reopened.get_preview(user).await.unwrap().value, set(&["b"]));
    }

    #[tokio::test]
    async fn test_namespaces_share_file_independently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let first = FileFlagStore::new(&path, "first");
        let second = FileFlagStore::new(&path, "second");

        first.put_published(&set(&["a"]), 0).await.unwrap();
        second.put_published(&set(&["b"]), 0).await.unwrap();
        first.clear().await.unwrap();

        assert!(first.get_published().await.unwrap().value.is_empty());
        assert_eq!(second.get_published().await.unwrap().value, set(&["b"]));
    }

    #[tokio::test]
    async fn test_conflict_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileFlagStore::new(dir.path().join("flags.json"), "site");
        store.put_published(&set(&["a"]), 0).await.unwrap();

        let err = store.put_published(&set(&["z"]), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get_published().await.unwrap().value, set(&["a"]));
    }

    #[tokio::test]
    async fn test_write_from_before_clear_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        let store = FileFlagStore::new(&path, "site");
        store.put_published(&set(&["a"]), 0).await.unwrap();
        let stale = store.get_published().await.unwrap();

        store.clear().await.unwrap();
        let reopened = FileFlagStore::new(&path, "site");
        let fresh = reopened.get_published().await.unwrap();
        assert!(fresh.version > stale.version);
        reopened.put_published(&set(&["b"]), fresh.version).await.unwrap();

        let err = store
            .put_published(&set(&["a", "c"]), stale.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get_published().await.unwrap().value, set(&["b"]));
    }

    #[tokio::test]
    async fn test_documents_without_floor_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        tokio::fs::write(
            &path,
            br#"{"site": {"published": {"value": ["a"], "version": 2}}}"#,
        )
        .await
        .unwrap();

        let store = FileFlagStore::new(&path, "site");
        let user = UserId::new(9).unwrap();
        assert_eq!(store.get_published().await.unwrap().version, 2);
        assert_eq!(store.get_preview(user).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_not_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = FileFlagStore::new(&path, "site");
        let err = store.get_published().await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
