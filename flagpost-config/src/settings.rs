// Flagpost settings

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Shortest accepted CSRF signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Where flag state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "file" => Ok(StoreBackend::File),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,

    /// JSON document path for the `file` backend
    pub path: Option<PathBuf>,

    /// Connection URL for the `redis` backend
    pub url: Option<String>,

    /// Upper bound for each store call, in milliseconds
    pub timeout_ms: u64,

    /// Version-checked write attempts before a mutation gives up
    pub max_write_attempts: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            url: None,
            timeout_ms: 2_000,
            max_write_attempts: 3,
        }
    }
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retry policy of the toggle service for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleSettings {
    /// Total attempts, including the first
    pub retry_attempts: u32,

    /// Delay before the first retry, doubled for each further one
    pub retry_backoff_ms: u64,
}

impl Default for ToggleSettings {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl ToggleSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Anti-forgery token settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfSettings {
    /// Signing secret. A random one is generated at startup when absent,
    /// which invalidates outstanding tokens on restart.
    pub secret: Option<String>,

    pub token_ttl_secs: i64,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl_secs: 86_400,
        }
    }
}

impl fmt::Debug for CsrfSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

/// Log output overrides. Unset fields keep what `FLAGPOST_LOG_*` selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// One of `trace`, `debug`, `info`, `warn`, `error`, `off`
    pub level: Option<String>,

    /// One of `pretty`, `compact`, `json`
    pub format: Option<String>,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error", "off", "none"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Complete Flagpost configuration.
///
/// # Examples
///
/// ```
/// use flagpost_config::{FlagpostConfig, StoreBackend, Validate};
///
/// let config = FlagpostConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.store.backend, StoreBackend::Memory);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagpostConfig {
    /// When false, toggle requests are refused. Flag queries still work.
    pub enabled: bool,

    /// Prefix of every persisted record
    pub namespace: String,

    pub store: StoreSettings,
    pub toggle: ToggleSettings,
    pub csrf: CsrfSettings,
    pub log: LogSettings,
}

impl Default for FlagpostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "flagpost".to_string(),
            store: StoreSettings::default(),
            toggle: ToggleSettings::default(),
            csrf: CsrfSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl FlagpostConfig {
    /// Apply overrides from prefix-stripped, lowercased environment keys such
    /// as `store_backend` or `csrf_secret`. Unrelated keys are ignored.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for (key, value) in vars {
            match key.as_str() {
                "enabled" => self.enabled = parse_bool(key, value)?,
                "namespace" => self.namespace = value.clone(),
                "store_backend" => self.store.backend = parse(key, value)?,
                "store_path" => self.store.path = Some(PathBuf::from(value)),
                "store_url" => self.store.url = Some(value.clone()),
                "store_timeout_ms" => self.store.timeout_ms = parse(key, value)?,
                "store_max_write_attempts" => self.store.max_write_attempts = parse(key, value)?,
                "toggle_retry_attempts" => self.toggle.retry_attempts = parse(key, value)?,
                "toggle_retry_backoff_ms" => self.toggle.retry_backoff_ms = parse(key, value)?,
                "csrf_secret" => self.csrf.secret = Some(value.clone()),
                "csrf_token_ttl_secs" => self.csrf.token_ttl_secs = parse(key, value)?,
                "log_level" => self.log.level = Some(value.clone()),
                "log_format" => self.log.format = Some(value.clone()),
                _ => {}
            }
        }
        Ok(())
    }
}

impl Validate for FlagpostConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::is_identifier(&self.namespace, "namespace")?;

        ConfigValidator::in_range(self.store.timeout_ms, 1, 60_000, "store.timeout_ms")?;
        ConfigValidator::in_range(
            self.store.max_write_attempts,
            1,
            100,
            "store.max_write_attempts",
        )?;
        match self.store.backend {
            StoreBackend::Memory => {}
            StoreBackend::File => {
                let path = self.store.path.as_ref().ok_or_else(|| {
                    ConfigError::ValidationError("store.path is required for the file backend".into())
                })?;
                ConfigValidator::not_empty(&path.to_string_lossy(), "store.path")?;
            }
            StoreBackend::Redis => {
                let url = self.store.url.as_deref().ok_or_else(|| {
                    ConfigError::ValidationError("store.url is required for the redis backend".into())
                })?;
                ConfigValidator::has_scheme(url, &["redis", "rediss"], "store.url")?;
            }
        }

        ConfigValidator::in_range(self.toggle.retry_attempts, 1, 10, "toggle.retry_attempts")?;
        ConfigValidator::in_range(
            self.toggle.retry_backoff_ms,
            0,
            10_000,
            "toggle.retry_backoff_ms",
        )?;

        if let Some(secret) = &self.csrf.secret {
            ConfigValidator::min_len(secret, MIN_SECRET_LEN, "csrf.secret")?;
        }
        ConfigValidator::in_range(self.csrf.token_ttl_secs, 60, 604_800, "csrf.token_ttl_secs")?;

        if let Some(level) = &self.log.level {
            one_of(level, LOG_LEVELS, "log.level")?;
        }
        if let Some(format) = &self.log.format {
            one_of(format, LOG_FORMATS, "log.format")?;
        }

        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn one_of(value: &str, allowed: &[&str], key: &str) -> Result<()> {
    let normalized = value.trim().to_lowercase();
    if allowed.contains(&normalized.as_str()) {
        return Ok(());
    }
    Err(ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}' is not one of {}", value, allowed.join(", ")),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{}'", value),
        }),
    }
}
