// Wiring a store, registry and toggle service from configuration

use flagpost_config::{ConfigError, FlagpostConfig, StoreBackend, Validate};
use flagpost_core::{
    FileFlagStore, FlagRegistry, FlagStore, MemoryFlagStore, RegistryOptions, StoreError,
};
use flagpost_log::info;
use flagpost_toggle::{ToggleError, ToggleService};
use std::sync::Arc;
use thiserror::Error;

/// Startup failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not open flag store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Toggle(#[from] ToggleError),

    /// The redis backend was configured but the `redis` feature is off.
    #[error("The redis store backend requires the `redis` feature")]
    BackendUnavailable,
}

/// A ready-to-use flag registry and toggle endpoint.
///
/// # Examples
///
/// ```
/// use flagpost::prelude::*;
///
/// # tokio_test::block_on(async {
/// let flagpost = Flagpost::from_config(&FlagpostConfig::default()).await.unwrap();
/// flagpost
///     .registry()
///     .register(Flag::new("new-ui", "New UI", "").stable(true))
///     .unwrap();
///
/// let state = flagpost.registry().load_viewer_state(Viewer::Anonymous).await;
/// assert!(!flagpost.registry().is_on("new-ui", &state).unwrap());
/// # });
/// ```
pub struct Flagpost {
    registry: Arc<FlagRegistry>,
    toggles: ToggleService,
}

impl Flagpost {
    /// Open the configured store and build the registry and toggle service.
    pub async fn from_config(config: &FlagpostConfig) -> Result<Self, BootstrapError> {
        config.validate()?;
        flagpost_log::configure(
            flagpost_log::config()
                .with_overrides(config.log.level.as_deref(), config.log.format.as_deref()),
        );

        let store = open_store(config).await?;
        let options = RegistryOptions::default()
            .with_store_timeout(config.store.timeout())
            .with_max_write_attempts(config.store.max_write_attempts);

        let registry = Arc::new(FlagRegistry::with_options(store, options));
        let toggles = ToggleService::from_config(registry.clone(), config)?;

        info!(
            target: "flagpost",
            "flagpost ready (namespace '{}', {:?} store)", config.namespace, config.store.backend
        );

        Ok(Self { registry, toggles })
    }

    /// Load configuration from `.env` and `FLAGPOST_*` variables, then build.
    pub async fn from_env() -> Result<Self, BootstrapError> {
        Self::from_config(&FlagpostConfig::from_env()?).await
    }

    pub fn registry(&self) -> &Arc<FlagRegistry> {
        &self.registry
    }

    pub fn toggles(&self) -> &ToggleService {
        &self.toggles
    }
}

async fn open_store(config: &FlagpostConfig) -> Result<Arc<dyn FlagStore>, BootstrapError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryFlagStore::new())),
        StoreBackend::File => {
            let path = config.store.path.clone().ok_or_else(|| {
                ConfigError::ValidationError("store.path is required for the file backend".into())
            })?;
            Ok(Arc::new(FileFlagStore::new(path, config.namespace.clone())))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis => {
            let url = config.store.url.as_deref().ok_or_else(|| {
                ConfigError::ValidationError("store.url is required for the redis backend".into())
            })?;
            let store =
                flagpost_core::RedisFlagStore::connect(url, config.namespace.clone()).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => Err(BootstrapError::BackendUnavailable),
    }
}
