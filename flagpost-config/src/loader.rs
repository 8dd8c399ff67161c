// Reading configuration files into layers

use crate::{ConfigError, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    /// `KEY=value` lines, read the same way as environment variables
    Env,
}

impl FileFormat {
    /// Pick a format from the file name: `*.json`, `*.toml`, `*.env` or a
    /// dotenv file such as `.env` or `.env.local`.
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError(format!("Not a file: {}", path.display())))?;

        if name == ".env" || name.starts_with(".env.") {
            return Ok(FileFormat::Env);
        }

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| ConfigError::LoadError(format!("No file extension: {}", name)))?;

        match ext.as_str() {
            "json" => Ok(FileFormat::Json),
            "toml" => Ok(FileFormat::Toml),
            "env" => Ok(FileFormat::Env),
            other => Err(ConfigError::LoadError(format!(
                "Unsupported configuration format '{}'",
                other
            ))),
        }
    }
}

/// What one configuration file contributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    /// A partial settings document, deep-merged over earlier documents
    Document(Value),
    /// Raw variables, applied like prefixed environment overrides
    Overrides(Vec<(String, String)>),
}

/// Reads one configuration file
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Loader for the format `path` names.
    pub fn for_path(path: impl AsRef<Path>) -> Result<Self> {
        FileFormat::detect(path.as_ref()).map(Self::new)
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Layer> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(&self, content: &str) -> Result<Layer> {
        match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map(Layer::Document)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
            FileFormat::Toml => {
                let table: toml::Table =
                    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
                serde_json::to_value(table)
                    .map(Layer::Document)
                    .map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            FileFormat::Env => dotenvy::from_read_iter(content.as_bytes())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Layer::Overrides)
                .map_err(|e| ConfigError::ParseError(e.to_string())),
        }
    }
}
