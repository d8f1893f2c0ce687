#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Batch Executor
//!
//! Request-batching coordinator for tokio applications.
//!
//! ## Overview
//!
//! Callers submit individual keys one at a time and get back a future for
//! each key's result. The coordinator accumulates submissions into batches
//! and calls a single bulk processing function per batch, then routes each
//! computed result back to the caller that asked for it. The fixed cost of
//! the bulk operation (a network call, a database round-trip) is amortized
//! across many concurrent, independently arriving requests.
//!
//! ## Flushing
//!
//! A batch is flushed when it reaches `max_batch_size`, or when
//! `flush_interval` has elapsed since it received its first request,
//! whichever comes first. Batches are processed concurrently with the
//! accumulation of the next one.
//!
//! ## Failure semantics
//!
//! - The processing function failing fails every request in that batch with
//!   the same error.
//! - A key missing from a successful result mapping fails only that request.
//! - Submissions after disposal fail immediately.
//! - Failed batches are never retried.
//!
//! ## Module Organization
//!
//! - [`coordinator`] - The batching engine and its caller-facing future
//! - [`processor`] - The bulk processing seam
//! - [`config`] - Configuration and layered loading
//! - [`error`] - Structured error handling
//! - [`stats`] - Atomic counters and snapshots
//! - [`metrics`] - OpenTelemetry instruments
//! - [`logging`] - Structured logging initialization
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_executor::{BatchConfig, BatchCoordinator};
//! use std::collections::HashMap;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::new()
//!     .with_name("user-names")
//!     .with_max_batch_size(50)
//!     .with_flush_interval(Duration::from_millis(5));
//!
//! let loader = BatchCoordinator::new(config, |ids: Vec<u64>| async move {
//!     // One round-trip for the whole batch
//!     Ok::<_, anyhow::Error>(
//!         ids.into_iter()
//!             .map(|id| (id, format!("user-{id}")))
//!             .collect::<HashMap<_, _>>(),
//!     )
//! })?;
//!
//! let name = loader.execute(7).await?;
//! assert_eq!(name, "user-7");
//!
//! loader.dispose();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod stats;

pub use config::{BatchConfig, ConfigLoader, ConfigurationError, DisposePolicy};
pub use coordinator::{
    BatchCoordinator, BatchCoordinatorBuilder, BatchFuture, BatchKey, BatchValue, DisposeOutcome,
};
pub use error::{BatchError, Result};
pub use processor::BatchProcessor;
pub use stats::{BatchStatsSnapshot, FlushTrigger};
