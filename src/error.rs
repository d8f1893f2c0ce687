//! # Batch Executor Error Types
//!
//! Structured error handling for the batching engine using thiserror.
//!
//! Every error a caller can observe through a [`BatchFuture`](crate::BatchFuture)
//! or a failed `submit` is a [`BatchError`]. The type is `Clone` so a single
//! processing failure can be fanned out to every request of a batch while all
//! of them report the same underlying cause.

use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigurationError;

/// Errors surfaced by the batch coordinator
#[derive(Error, Debug, Clone)]
pub enum BatchError {
    /// `submit` was called after the coordinator was disposed
    #[error("Coordinator closed: {name} no longer accepts submissions")]
    Closed { name: String },

    /// The request was still buffered when the coordinator was disposed
    /// under [`DisposePolicy::FailPending`](crate::DisposePolicy::FailPending)
    #[error("Coordinator disposed: {name} dropped the request before it was flushed")]
    Disposed { name: String },

    /// The processing function failed for the whole batch
    #[error("Batch processing failed: {cause}")]
    ProcessingFailed { cause: Arc<anyhow::Error> },

    /// The processing function succeeded but produced no entry for this key
    #[error("Result not produced for key {key}")]
    MissingResult { key: String },

    /// The completion handle was dropped without being resolved
    #[error("Batch request abandoned before a result was delivered")]
    Abandoned,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// No tokio runtime was available to drive timers and dispatch
    #[error("Runtime unavailable: {message}")]
    Runtime { message: String },
}

impl BatchError {
    /// Create a closed-coordinator error
    pub fn closed(name: impl Into<String>) -> Self {
        Self::Closed { name: name.into() }
    }

    /// Create a disposed-before-flush error
    pub fn disposed(name: impl Into<String>) -> Self {
        Self::Disposed { name: name.into() }
    }

    /// Wrap a processing failure so it can be shared across a batch
    pub fn processing_failed(cause: anyhow::Error) -> Self {
        Self::ProcessingFailed {
            cause: Arc::new(cause),
        }
    }

    /// Create a missing-result error for a key
    pub fn missing_result<K: std::fmt::Debug>(key: &K) -> Self {
        Self::MissingResult {
            key: format!("{key:?}"),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Whether this error was produced because the coordinator is shut down
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::Disposed { .. })
    }

    /// The processing function's error, if this is a batch failure
    pub fn processing_cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::ProcessingFailed { cause } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
