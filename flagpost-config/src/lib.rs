// Configuration management for Flagpost

pub mod builder;
pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use builder::ConfigBuilder;
pub use env::{ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat, Layer};
pub use settings::{
    CsrfSettings, FlagpostConfig, LogSettings, MIN_SECRET_LEN, StoreBackend, StoreSettings,
    ToggleSettings,
};
pub use validation::{ConfigValidator, Validate};

impl FlagpostConfig {
    /// Start a layered load. See [`ConfigBuilder`].
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Load from a file and `FLAGPOST_*` environment variables.
    pub fn from_file(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::builder().add_file(path).load_env().build()
    }

    /// Load from `.env` (if present) and `FLAGPOST_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::builder().load_dotenv(None).load_env().build()
    }
}
