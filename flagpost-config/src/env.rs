// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Prefix of every Flagpost environment variable.
pub const ENV_PREFIX: &str = "FLAGPOST";

/// Environment variable loader
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all matching environment variables
    pub fn load(&self) -> HashMap<String, String> {
        self.load_from(env::vars())
    }

    /// Filter and normalize `vars` the way [`load`](Self::load) does with the
    /// process environment: the prefix is stripped and keys are lowercased.
    pub fn load_from<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = HashMap::new();

        for (key, value) in vars {
            match self.prefix {
                Some(ref prefix) => {
                    if let Some(rest) = key.strip_prefix(prefix.as_str())
                        && let Some(rest) = rest.strip_prefix('_')
                    {
                        config.insert(rest.to_lowercase(), value);
                    }
                }
                None => {
                    config.insert(key.to_lowercase(), value);
                }
            }
        }

        config
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        let full_key = if let Some(ref prefix) = self.prefix {
            format!("{}_{}", prefix, key.to_uppercase())
        } else {
            key.to_uppercase()
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(Some(ENV_PREFIX.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::default();
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }

    #[test]
    fn test_prefix_is_stripped_and_lowercased() {
        let loader = EnvLoader::default();
        let loaded = loader.load_from(vars(&[
            ("FLAGPOST_STORE_BACKEND", "file"),
            ("FLAGPOSTER_NAMESPACE", "nope"),
            ("PATH", "/usr/bin"),
        ]));

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("store_backend").map(String::as_str), Some("file"));
    }

    #[test]
    fn test_no_prefix_keeps_everything() {
        let loader = EnvLoader::new(None);
        let loaded = loader.load_from(vars(&[("A", "1"), ("B", "2")]));
        assert_eq!(loaded.get("a").map(String::as_str), Some("1"));
        assert_eq!(loaded.len(), 2);
    }
}
