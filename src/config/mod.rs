//! # Publisher Configuration
//!
//! Batching and retry settings for the publisher. Every field has a default, so
//! a configuration file only needs to name the values it overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pubsub_publisher::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new().with_file("config/publisher.toml").load()?;
//! let max_messages = config.batch.max_messages;
//! let latency = config.batch.max_latency();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::messaging::SERVER_PUBLISH_MAX_BYTES;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{load_config, ConfigLoader};

/// Limits applied to every batch for its whole lifetime
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Maximum request size in bytes, capped by the server ceiling
    pub max_bytes: usize,

    /// How long an open batch waits before it is committed
    pub max_latency_ms: u64,

    /// Maximum number of messages per batch
    pub max_messages: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_bytes: 1000 * 1000,
            max_latency_ms: 10,
            max_messages: 100,
        }
    }
}

impl BatchSettings {
    pub fn new(max_bytes: usize, max_latency: Duration, max_messages: usize) -> Self {
        Self {
            max_bytes,
            max_latency_ms: u64::try_from(max_latency.as_millis()).unwrap_or(u64::MAX),
            max_messages,
        }
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    /// Byte limit actually enforced: the configured limit or the server ceiling
    pub fn effective_max_bytes(&self) -> usize {
        self.max_bytes.min(SERVER_PUBLISH_MAX_BYTES)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_messages == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.max_messages",
                self.max_messages,
                "must be at least 1",
            ));
        }
        if self.max_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch.max_bytes",
                self.max_bytes,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Retry policy applied to the publish call by `RetryingTransport`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishRetrySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Total time budget across all attempts
    pub deadline_ms: u64,
    /// Time budget for a single attempt
    pub timeout_ms: u64,
}

impl Default for PublishRetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 60_000,
            backoff_multiplier: 1.3,
            deadline_ms: 60_000,
            timeout_ms: 60_000,
        }
    }
}

impl PublishRetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff to use after `current`, grown by the multiplier and capped
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_backoff())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.backoff_multiplier",
                self.backoff_multiplier,
                "must be >= 1.0",
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.initial_backoff_ms",
                self.initial_backoff_ms,
                format!("must not exceed max_backoff_ms ({})", self.max_backoff_ms),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.timeout_ms",
                self.timeout_ms,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub batch: BatchSettings,
    pub retry: PublishRetrySettings,
}

impl PublisherConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.batch.validate()?;
        self.retry.validate()
    }
}
