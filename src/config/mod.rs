//! # Batch Executor Configuration
//!
//! Construction parameters for a [`BatchCoordinator`](crate::BatchCoordinator).
//! All values are immutable once a coordinator has been built from them.
//!
//! ## Usage
//!
//! ```rust
//! use batch_executor::config::{BatchConfig, DisposePolicy};
//! use std::time::Duration;
//!
//! let config = BatchConfig::new()
//!     .with_name("user-loader")
//!     .with_max_batch_size(50)
//!     .with_flush_interval(Duration::from_millis(20))
//!     .with_dispose_policy(DisposePolicy::FailPending);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.flush_interval(), Duration::from_millis(20));
//! ```
//!
//! Layered loading from TOML files and `BATCH_EXECUTOR__*` environment
//! variables is handled by [`ConfigLoader`].

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Default upper bound on requests per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default flush interval in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 50;

/// What happens to a non-empty, unflushed buffer when the coordinator is disposed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposePolicy {
    /// Dispatch the remaining buffer as one final batch
    #[default]
    Flush,
    /// Resolve every buffered request with `BatchError::Disposed`
    FailPending,
}

impl std::fmt::Display for DisposePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisposePolicy::Flush => write!(f, "flush"),
            DisposePolicy::FailPending => write!(f, "fail_pending"),
        }
    }
}

/// Configuration for a batch coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Name used in log events, metric labels, and shutdown errors
    pub name: String,

    /// Size threshold that triggers an immediate flush (must be >= 1)
    pub max_batch_size: usize,

    /// Maximum time a non-empty, under-threshold buffer waits before flushing
    pub flush_interval_ms: u64,

    /// Fate of the pending buffer on disposal
    pub dispose_policy: DisposePolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            name: "batch-executor".to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            dispose_policy: DisposePolicy::default(),
        }
    }
}

impl BatchConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the flush interval; sub-millisecond precision is truncated
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_dispose_policy(mut self, policy: DisposePolicy) -> Self {
        self.dispose_policy = policy;
        self
    }

    /// Flush interval as a `Duration`
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_batch_size",
                self.max_batch_size,
                "must be a positive integer",
            ));
        }

        if self.flush_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "flush_interval_ms",
                self.flush_interval_ms,
                "must be at least 1 millisecond",
            ));
        }

        if self.name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "name",
                &self.name,
                "must not be blank",
            ));
        }

        Ok(())
    }
}
