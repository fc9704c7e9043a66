//! Configuration for the ingest pipeline.

use audit_common::DEFAULT_PREVIEW_CHARS;
use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

/// Index store location.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite path, optionally prefixed with `sqlite:`.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// Cap, in characters, on previews built from parsed bodies.
    #[serde(default = "default_preview_chars")]
    pub max_chars: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_chars: default_preview_chars(),
        }
    }
}

/// Object store holding the audit documents.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SourceConfig {
    /// Falls back to the AWS environment when unset.
    #[serde(default)]
    pub region: Option<String>,
}

fn default_store_path() -> String {
    "./data/audit-index.db".to_string()
}

fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

impl Config {
    /// Load from an optional `ingest.{toml,yaml,json}` file, then `INGEST__*`
    /// environment variables (e.g. `INGEST__STORE__PATH`).
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("ingest").required(false))
            .add_source(
                Environment::with_prefix("INGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
