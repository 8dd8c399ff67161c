//! Redis flag store.

use super::{
    FlagSet, FlagStore, StoreError, StoreResult, Versioned, floor_record, preview_record,
    published_record,
};
use crate::viewer::UserId;
use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};
use std::sync::Arc;

/// Read a `{version, flags}` hash. A missing hash reads at the namespace
/// floor in `KEYS[2]`.
const READ_SCRIPT: &str = r#"
local record = redis.call('HMGET', KEYS[1], 'version', 'flags')
local version = record[1] or redis.call('GET', KEYS[2]) or '0'
return {tonumber(version), record[2] or ''}
"#;

/// Compare-and-swap on a `{version, flags}` hash. A missing hash starts at
/// the floor in `KEYS[2]`. `KEYS[3]`, when given, is the index set that
/// remembers every preview record for `clear`.
const SWAP_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or redis.call('GET', KEYS[2]) or '0')
if current ~= tonumber(ARGV[1]) then
    return {0, current}
end
local next = current + 1
redis.call('HSET', KEYS[1], 'version', next, 'flags', ARGV[2])
if KEYS[3] then
    redis.call('SADD', KEYS[3], KEYS[1])
end
return {1, next}
"#;

/// Delete the published record `KEYS[1]` and every preview listed in the
/// index `KEYS[2]`, then raise the floor `KEYS[3]` above every version seen.
const CLEAR_SCRIPT: &str = r#"
local highest = tonumber(redis.call('GET', KEYS[3]) or '0')
local records = redis.call('SMEMBERS', KEYS[2])
table.insert(records, KEYS[1])
for _, key in ipairs(records) do
    local version = tonumber(redis.call('HGET', key, 'version') or '0')
    if version > highest then
        highest = version
    end
    redis.call('DEL', key)
end
redis.call('DEL', KEYS[2])
redis.call('SET', KEYS[3], highest + 1)
return highest + 1
"#;

/// Flag store backed by Redis hashes.
///
/// Each record is a hash holding a `version` counter and a JSON `flags`
/// array; writes are applied by a Lua script so the version check and the
/// update are atomic across processes.
#[derive(Clone)]
pub struct RedisFlagStore {
    connection: ConnectionManager,
    namespace: Arc<str>,
    scripts: Arc<Scripts>,
}

struct Scripts {
    read: Script,
    swap: Script,
    clear: Script,
}

impl RedisFlagStore {
    /// Connect to Redis.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flagpost_core::store::RedisFlagStore;
    ///
    /// # async fn example() -> flagpost_core::store::StoreResult<()> {
    /// let store = RedisFlagStore::connect("redis://localhost:6379", "my-site").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str, namespace: impl Into<String>) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            connection,
            namespace: Arc::from(namespace.into()),
            scripts: Arc::new(Scripts {
                read: Script::new(READ_SCRIPT),
                swap: Script::new(SWAP_SCRIPT),
                clear: Script::new(CLEAR_SCRIPT),
            }),
        })
    }

    fn index_key(&self) -> String {
        format!("{}_preview_records", self.namespace)
    }

    fn floor_key(&self) -> String {
        floor_record(&self.namespace)
    }

    async fn read(&self, key: &str) -> StoreResult<Versioned<FlagSet>> {
        let mut conn = self.connection.clone();

        let (version, flags): (u64, String) = self
            .scripts
            .read
            .key(key)
            .key(self.floor_key())
            .invoke_async(&mut conn)
            .await?;

        let value = if flags.is_empty() {
            FlagSet::new()
        } else {
            serde_json::from_str(&flags)?
        };

        Ok(Versioned::new(value, version))
    }

    async fn write(
        &self,
        key: &str,
        index: Option<&str>,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(flags)?;

        let mut invocation = self.scripts.swap.key(key);
        invocation.key(self.floor_key());
        if let Some(index) = index {
            invocation.key(index);
        }

        let (applied, version): (i64, u64) = invocation
            .arg(expected_version)
            .arg(json)
            .invoke_async(&mut conn)
            .await?;

        if applied == 1 {
            Ok(version)
        } else {
            Err(StoreError::Conflict {
                expected: expected_version,
                actual: version,
            })
        }
    }
}

#[async_trait]
impl FlagStore for RedisFlagStore {
    async fn get_published(&self) -> StoreResult<Versioned<FlagSet>> {
        self.read(&published_record(&self.namespace)).await
    }

    async fn put_published(&self, flags: &FlagSet, expected_version: u64) -> StoreResult<u64> {
        self.write(&published_record(&self.namespace), None, flags, expected_version)
            .await
    }

    async fn get_preview(&self, user: UserId) -> StoreResult<Versioned<FlagSet>> {
        self.read(&preview_record(&self.namespace, user)).await
    }

    async fn put_preview(
        &self,
        user: UserId,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64> {
        let index = self.index_key();
        self.write(
            &preview_record(&self.namespace, user),
            Some(&index),
            flags,
            expected_version,
        )
        .await
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();

        let _floor: u64 = self
            .scripts
            .clear
            .key(published_record(&self.namespace))
            .key(self.index_key())
            .key(self.floor_key())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
