//! Flag catalog and state mutation.
//!
//! The registry owns the catalog of registered flags and is the only path
//! through which published and preview sets are read or written. Use is two
//! phase: register flags at startup, then per request call
//! [`FlagRegistry::load_viewer_state`] and query against the returned
//! [`ViewerState`].

use crate::error::{FlagError, Result};
use crate::flag::{DEFAULT_GROUP, Flag, FlagMeta, FlagState};
use crate::outcome::{MutationOutcome, Rejection};
use crate::store::{FlagSet, FlagStore, StoreError, StoreResult, Versioned};
use crate::viewer::{UserId, Viewer};
use dashmap::DashMap;
use flagpost_log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const LOG_TARGET: &str = "flagpost::registry";

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Upper bound for every individual store call
    pub store_timeout: Duration,

    /// Attempts at a version-checked write before giving up on conflicts
    pub max_write_attempts: u32,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(2),
            max_write_attempts: 3,
        }
    }
}

impl RegistryOptions {
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }
}

/// Published and preview state as seen by one viewer for one request.
#[derive(Debug, Clone, Default)]
pub struct ViewerState {
    viewer: Viewer,
    published: Arc<FlagSet>,
    preview: Arc<FlagSet>,
    degraded: Option<String>,
}

impl ViewerState {
    pub fn new(viewer: Viewer, published: FlagSet, preview: FlagSet) -> Self {
        Self {
            viewer,
            published: Arc::new(published),
            preview: Arc::new(preview),
            degraded: None,
        }
    }

    pub fn viewer(&self) -> Viewer {
        self.viewer
    }

    pub fn published(&self) -> &FlagSet {
        &self.published
    }

    pub fn preview(&self) -> &FlagSet {
        &self.preview
    }

    /// True when the store could not be read and this state was assembled
    /// from the last known published set and an empty preview set.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }
}

/// A flag bound to the state of one viewer.
#[derive(Debug, Clone)]
pub struct FlagView<'a> {
    flag: Arc<Flag>,
    state: &'a ViewerState,
}

impl FlagView<'_> {
    pub fn flag(&self) -> &Flag {
        &self.flag
    }

    pub fn key(&self) -> &str {
        self.flag.key()
    }

    pub fn can_be_published(&self) -> bool {
        self.flag.can_be_published()
    }

    pub fn is_published(&self) -> bool {
        self.flag.is_published(self.state.published())
    }

    pub fn in_preview_state(&self) -> bool {
        self.flag
            .in_preview_state(self.state.published(), self.state.preview())
    }

    pub fn is_on(&self) -> bool {
        self.flag.is_on(self.state.published(), self.state.preview())
    }

    pub fn state(&self) -> FlagState {
        self.flag.state(self.state.published(), self.state.preview())
    }

    /// Serializable description of the flag and its resolved state.
    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            key: self.flag.key.clone(),
            name: self.flag.name.clone(),
            description: self.flag.description.clone(),
            group: self.flag.group.clone(),
            meta: self.flag.meta.clone(),
            stable: self.flag.stable,
            enforced: self.flag.enforced,
            parent: self.flag.parent.clone(),
            state: self.state(),
        }
    }
}

/// Flag descriptor plus resolved state, for rendering code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagSnapshot {
    pub key: String,
    pub name: String,
    pub description: String,
    pub group: String,
    pub meta: Vec<FlagMeta>,
    pub stable: bool,
    pub enforced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub state: FlagState,
}

#[derive(Default)]
struct Catalog {
    order: Vec<String>,
    flags: HashMap<String, Arc<Flag>>,
}

impl Catalog {
    fn iter(&self) -> impl Iterator<Item = &Arc<Flag>> {
        self.order.iter().filter_map(|key| self.flags.get(key))
    }
}

#[derive(Debug, Clone, Copy)]
enum Record {
    Published,
    Preview(UserId),
}

/// Catalog of known flags and gateway to their persisted state.
pub struct FlagRegistry {
    store: Arc<dyn FlagStore>,
    options: RegistryOptions,
    catalog: RwLock<Catalog>,
    last_published: RwLock<Versioned<Arc<FlagSet>>>,
    publish_lock: Mutex<()>,
    preview_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl FlagRegistry {
    pub fn new(store: Arc<dyn FlagStore>) -> Self {
        Self::with_options(store, RegistryOptions::default())
    }

    pub fn with_options(store: Arc<dyn FlagStore>, options: RegistryOptions) -> Self {
        Self {
            store,
            options,
            catalog: RwLock::new(Catalog::default()),
            last_published: RwLock::new(Versioned::default()),
            publish_lock: Mutex::new(()),
            preview_locks: DashMap::new(),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    // ========== Registration ==========

    /// Add a flag to the catalog, replacing any flag with the same key.
    ///
    /// A replaced flag keeps its original position in listing order.
    pub fn register(&self, flag: Flag) -> Result<()> {
        let flag = flag.normalize()?;
        let key = flag.key.clone();

        let mut catalog = self.catalog.write();
        if catalog.flags.insert(key.clone(), Arc::new(flag)).is_some() {
            debug!(target: LOG_TARGET, "replaced flag '{}'", key);
        } else {
            debug!(target: LOG_TARGET, "registered flag '{}'", key);
            catalog.order.push(key);
        }

        Ok(())
    }

    /// Register several flags, stopping at the first invalid one.
    pub fn register_all<I>(&self, flags: I) -> Result<()>
    where
        I: IntoIterator<Item = Flag>,
    {
        flags.into_iter().try_for_each(|flag| self.register(flag))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.catalog.read().flags.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.catalog.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========== Queries ==========

    /// Look up a flag descriptor.
    pub fn flag(&self, key: &str) -> Result<Arc<Flag>> {
        self.catalog
            .read()
            .flags
            .get(key)
            .cloned()
            .ok_or_else(|| FlagError::UnknownFlag(key.to_string()))
    }

    /// Look up a flag and bind it to a viewer's state.
    pub fn get_flag<'a>(&self, key: &str, state: &'a ViewerState) -> Result<FlagView<'a>> {
        Ok(FlagView {
            flag: self.flag(key)?,
            state,
        })
    }

    /// Whether `key` is on for the viewer `state` was loaded for.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagpost_core::{Flag, FlagRegistry, MemoryFlagStore, Viewer};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let registry = FlagRegistry::new(Arc::new(MemoryFlagStore::new()));
    /// registry.register(Flag::new("beta", "Beta", "").stable(true)).unwrap();
    ///
    /// let state = registry.load_viewer_state(Viewer::Anonymous).await;
    /// assert!(!registry.is_on("beta", &state).unwrap());
    /// assert!(registry.is_on("missing", &state).is_err());
    /// # });
    /// ```
    pub fn is_on(&self, key: &str, state: &ViewerState) -> Result<bool> {
        Ok(self.get_flag(key, state)?.is_on())
    }

    /// All flags in registration order.
    pub fn list_flags(&self) -> Vec<Arc<Flag>> {
        self.catalog.read().iter().cloned().collect()
    }

    /// Group names: the default group first, then the rest alphabetically.
    pub fn list_groups(&self) -> Vec<String> {
        let catalog = self.catalog.read();
        let others: BTreeSet<&str> = catalog
            .iter()
            .map(|flag| flag.group())
            .filter(|group| *group != DEFAULT_GROUP)
            .collect();

        std::iter::once(DEFAULT_GROUP)
            .chain(others)
            .map(str::to_string)
            .collect()
    }

    pub fn list_flags_in_group(&self, group: &str) -> Vec<Arc<Flag>> {
        self.filter_flags(|flag| flag.group() == group)
    }

    /// Flags switched on in code.
    pub fn list_enforced_flags(&self) -> Vec<Arc<Flag>> {
        self.filter_flags(Flag::is_enforced)
    }

    /// Flags operators can see in the toggle listing: everything not
    /// enforced, including unstable flags.
    pub fn list_available_flags(&self) -> Vec<Arc<Flag>> {
        self.filter_flags(|flag| !flag.is_enforced())
    }

    fn filter_flags<F>(&self, predicate: F) -> Vec<Arc<Flag>>
    where
        F: Fn(&Flag) -> bool,
    {
        self.catalog
            .read()
            .iter()
            .filter(|flag| predicate(flag))
            .cloned()
            .collect()
    }

    // ========== State loading ==========

    /// Read the published set and, for authenticated viewers, their preview
    /// set.
    ///
    /// Never fails: if the store cannot be read, the last published set this
    /// registry saw and an empty preview set are used instead and the
    /// returned state is marked degraded.
    pub async fn load_viewer_state(&self, viewer: Viewer) -> ViewerState {
        let mut degraded = None;

        let published = match self.timed(self.store.get_published()).await {
            Ok(record) => self.observe_published(record),
            Err(e) => {
                warn!(target: LOG_TARGET, "using last known published flags: {}", e);
                degraded = Some(e.to_string());
                self.last_known_published()
            }
        };

        let preview = match viewer.user_id() {
            None => Arc::default(),
            Some(user) => match self.timed(self.store.get_preview(user)).await {
                Ok(record) => Arc::new(record.value),
                Err(e) => {
                    warn!(target: LOG_TARGET, "ignoring preview flags of user {}: {}", user, e);
                    degraded.get_or_insert_with(|| e.to_string());
                    Arc::default()
                }
            },
        };

        ViewerState {
            viewer,
            published,
            preview,
            degraded,
        }
    }

    /// Published set as of the last successful store read or write.
    pub fn last_known_published(&self) -> Arc<FlagSet> {
        self.last_published.read().value.clone()
    }

    /// Remember a published set read from the store unless a newer one has
    /// been seen already.
    fn observe_published(&self, record: Versioned<FlagSet>) -> Arc<FlagSet> {
        let flags = Arc::new(record.value);
        let mut cached = self.last_published.write();
        if record.version >= cached.version {
            *cached = Versioned::new(flags.clone(), record.version);
        }
        flags
    }

    // ========== Mutations ==========

    /// Publish or unpublish a flag for every viewer.
    pub async fn set_publish_status(&self, key: &str, published: bool) -> Result<MutationOutcome> {
        let flag = self.flag(key)?;

        if let Some(reason) = flag.publish_blocker() {
            // Enforced flags read as published and unstable ones as not, so
            // asking for the state they already have is not a rejection.
            if flag.is_published(&FlagSet::new()) == published {
                return Ok(MutationOutcome::Unchanged);
            }
            info!(target: LOG_TARGET, "refused to change publish status of '{}': {}", key, reason);
            return Ok(MutationOutcome::Rejected(reason));
        }

        let _guard = self.publish_lock.lock().await;
        self.update_membership(Record::Published, key, published)
            .await
    }

    /// Apply [`set_publish_status`](Self::set_publish_status) to each key in
    /// turn. A failure for one key does not stop the others.
    pub async fn set_publish_status_batch<I, K>(
        &self,
        keys: I,
        published: bool,
    ) -> Vec<(String, Result<MutationOutcome>)>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut results = Vec::new();
        for key in keys {
            let key = key.as_ref();
            results.push((key.to_string(), self.set_publish_status(key, published).await));
        }
        results
    }

    /// Start or stop previewing a flag for one user.
    pub async fn set_preview_status(
        &self,
        key: &str,
        previewing: bool,
        viewer: Viewer,
    ) -> Result<MutationOutcome> {
        let flag = self.flag(key)?;

        let Some(user) = viewer.user_id() else {
            return Ok(MutationOutcome::Rejected(Rejection::AnonymousViewer));
        };

        let published = self.timed(self.store.get_published()).await?;
        let published = self.observe_published(published);

        if flag.is_published(&published) {
            info!(target: LOG_TARGET, "refused to preview published flag '{}'", key);
            return Ok(MutationOutcome::Rejected(Rejection::AlreadyPublished));
        }
        if let Some(reason) = flag.publish_blocker() {
            info!(target: LOG_TARGET, "refused to preview '{}': {}", key, reason);
            return Ok(MutationOutcome::Rejected(reason));
        }

        let lock = self.preview_locks.entry(user).or_default().clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.update_membership(Record::Preview(user), key, previewing)
                .await
        };

        // Drop the user's lock once nobody else is waiting on it.
        drop(lock);
        self.preview_locks
            .remove_if(&user, |_, lock| Arc::strong_count(lock) == 1);

        outcome
    }

    /// Delete all persisted published and preview state.
    ///
    /// Mutations racing the reset either land before it or are re-read and
    /// applied on top of the cleared state.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.publish_lock.lock().await;

        self.timed(self.store.clear()).await?;
        match self.timed(self.store.get_published()).await {
            Ok(record) => {
                *self.last_published.write() =
                    Versioned::new(Arc::new(record.value), record.version);
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "could not re-read published flags after reset: {}", e);
                self.last_published.write().value = Arc::default();
            }
        }

        info!(target: LOG_TARGET, "cleared all persisted flag state");
        Ok(())
    }

    /// Add or remove `key` in one record with a version-checked write,
    /// re-reading on conflict. Callers hold the record's lock.
    async fn update_membership(
        &self,
        record: Record,
        key: &str,
        include: bool,
    ) -> Result<MutationOutcome> {
        let attempts = self.options.max_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            let current = self.timed(self.read_record(record)).await?;

            if current.value.contains(key) == include {
                self.remember(record, current);
                return Ok(MutationOutcome::Unchanged);
            }

            let mut next = current.value;
            if include {
                next.insert(key.to_string());
            } else {
                next.remove(key);
            }
            self.retain_known(&mut next);

            match self
                .timed(self.write_record(record, &next, current.version))
                .await
            {
                Ok(version) => {
                    debug!(
                        target: LOG_TARGET,
                        "{:?}: {} '{}' (version {})",
                        record,
                        if include { "added" } else { "removed" },
                        key,
                        version
                    );
                    self.remember(record, Versioned::new(next, version));
                    return Ok(MutationOutcome::Applied);
                }
                Err(StoreError::Conflict { expected, actual }) if attempt < attempts => {
                    debug!(
                        target: LOG_TARGET,
                        "{:?} changed underneath us ({} -> {}), retrying",
                        record,
                        expected,
                        actual
                    );
                    attempt += 1;
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, "failed to update {:?} for '{}': {}", record, key, e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn read_record(&self, record: Record) -> StoreResult<Versioned<FlagSet>> {
        match record {
            Record::Published => self.store.get_published().await,
            Record::Preview(user) => self.store.get_preview(user).await,
        }
    }

    async fn write_record(&self, record: Record, flags: &FlagSet, version: u64) -> StoreResult<u64> {
        match record {
            Record::Published => self.store.put_published(flags, version).await,
            Record::Preview(user) => self.store.put_preview(user, flags, version).await,
        }
    }

    fn remember(&self, record: Record, flags: Versioned<FlagSet>) {
        if let Record::Published = record {
            self.observe_published(flags);
        }
    }

    /// Drop keys that are no longer registered before a set is written back.
    fn retain_known(&self, flags: &mut FlagSet) {
        let catalog = self.catalog.read();
        flags.retain(|key| catalog.flags.contains_key(key));
    }

    async fn timed<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.options.store_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}
