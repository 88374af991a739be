//! Configuration Loader
//!
//! Layers an optional TOML file under environment variable overrides and
//! validates the result. Environment keys use a double-underscore separator,
//! e.g. `PUBSUB__BATCH__MAX_MESSAGES=500`.

use super::error::{ConfigResult, ConfigurationError};
use super::PublisherConfig;
use config::{Config, Environment, File, FileFormat};
use std::path::PathBuf;
use tracing::{debug, info};

/// Prefix for environment overrides
pub const DEFAULT_ENV_PREFIX: &str = "PUBSUB";

/// Environment variable naming the configuration file used by [`load_config`]
pub const CONFIG_PATH_ENV: &str = "PUBSUB_CONFIG_PATH";

/// Builder-style loader for [`PublisherConfig`]
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Read settings from a TOML file; the file must exist
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> ConfigResult<PublisherConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigurationError::file_not_found(path));
            }
            debug!(path = %path.display(), "Loading publisher configuration file");
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: PublisherConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            max_messages = config.batch.max_messages,
            max_bytes = config.batch.max_bytes,
            max_latency_ms = config.batch.max_latency_ms,
            "Publisher configuration loaded"
        );

        Ok(config)
    }
}

/// Load configuration from `PUBSUB_CONFIG_PATH` (when set) plus environment overrides
pub fn load_config() -> ConfigResult<PublisherConfig> {
    let loader = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.is_empty() => ConfigLoader::new().with_file(path),
        _ => ConfigLoader::new(),
    };
    loader.load()
}
