// Layered configuration loading

use crate::env::{ENV_PREFIX, EnvLoader};
use crate::loader::{ConfigLoader, Layer};
use crate::settings::FlagpostConfig;
use crate::validation::Validate;
use crate::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Builds a [`FlagpostConfig`] from defaults, files and the environment.
///
/// Later layers win: defaults, then files in the order added, then `.env`,
/// then process environment variables.
///
/// # Examples
///
/// ```no_run
/// use flagpost_config::FlagpostConfig;
///
/// let config = FlagpostConfig::builder()
///     .add_file("flagpost.toml")
///     .load_dotenv(None)
///     .load_env()
///     .build()
///     .unwrap();
/// ```
pub struct ConfigBuilder {
    files: Vec<PathBuf>,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    prefix: String,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Set environment variable prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Add a configuration file; the format follows the extension
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Enable overrides from environment variables
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Enable loading a `.env` file into the environment first. Without a
    /// path, a missing `.env` in the working directory is not an error.
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<FlagpostConfig> {
        if self.load_dotenv {
            match &self.dotenv_path {
                Some(path) => {
                    dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
                }
                None => {
                    dotenvy::dotenv().ok();
                }
            }
        }

        let vars: Vec<(String, String)> = if self.load_env {
            env::vars().collect()
        } else {
            Vec::new()
        };
        self.build_with_vars(vars)
    }

    /// Like [`build`](Self::build), reading overrides from `vars` instead of
    /// the process environment.
    pub fn build_with_vars<I>(self, vars: I) -> Result<FlagpostConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env_loader = EnvLoader::new(Some(self.prefix.clone()));
        let mut document = serde_json::to_value(FlagpostConfig::default())
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        let mut overrides = HashMap::new();

        for path in &self.files {
            match ConfigLoader::for_path(path)?.load_file(path)? {
                Layer::Document(value) => merge(&mut document, value),
                Layer::Overrides(pairs) => overrides.extend(env_loader.load_from(pairs)),
            }
        }

        let mut config: FlagpostConfig = serde_json::from_value(document)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;

        overrides.extend(env_loader.load_from(vars));
        config.apply_env(&overrides)?;

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay `overlay` onto `base`. Tables merge, everything else
/// replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_nested() {
        let mut base = json!({"store": {"backend": "memory", "timeout_ms": 2000}, "enabled": true});
        merge(&mut base, json!({"store": {"backend": "file"}, "enabled": false}));

        assert_eq!(
            base,
            json!({"store": {"backend": "file", "timeout_ms": 2000}, "enabled": false})
        );
    }

    #[test]
    fn test_defaults_without_layers() {
        let config = ConfigBuilder::new()
            .build_with_vars(Vec::<(String, String)>::new())
            .unwrap();
        assert_eq!(config, FlagpostConfig::default());
    }

    #[test]
    fn test_custom_prefix() {
        let config = ConfigBuilder::new()
            .with_prefix("MYSITE_FLAGS")
            .build_with_vars(vec![
                ("MYSITE_FLAGS_NAMESPACE".to_string(), "mysite".to_string()),
                ("FLAGPOST_NAMESPACE".to_string(), "ignored".to_string()),
            ])
            .unwrap();
        assert_eq!(config.namespace, "mysite");
    }

    #[test]
    fn test_missing_file_fails() {
        let result = ConfigBuilder::new()
            .add_file("/definitely/not/here/flagpost.toml")
            .build_with_vars(Vec::<(String, String)>::new());
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
