//! # Batch Coordinator
//!
//! Accepts individually submitted keys, accumulates them into batches, and
//! invokes one bulk processing call per batch.
//!
//! ## Flush triggers
//!
//! - **Size**: the submission that brings the buffer to `max_batch_size`
//!   detaches it immediately.
//! - **Timer**: a countdown armed when the buffer goes from empty to
//!   non-empty detaches it after `flush_interval`.
//! - **Manual** and **Dispose**: [`BatchCoordinator::flush`] and
//!   [`BatchCoordinator::dispose`].
//!
//! All triggers detach under the same lock. Each buffer carries a generation
//! number and the timer remembers the generation it was armed for, so a
//! timer that fires after its buffer was already taken by another trigger
//! finds a newer generation and does nothing. A buffer is therefore handed
//! to the processing function exactly once.
//!
//! The processing function always runs on a spawned task after the lock is
//! released; `submit` never waits for it.

mod buffer;
mod completion;
mod dispatch;
mod timer;

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::{BatchConfig, ConfigurationError, DisposePolicy};
use crate::error::{BatchError, Result};
use crate::metrics::BatchMetricsRecorder;
use crate::processor::BatchProcessor;
use crate::stats::{BatchStats, BatchStatsSnapshot, FlushTrigger};

use buffer::{Buffer, DetachedBatch, PendingRequest};
use dispatch::DispatchContext;
use timer::FlushTimer;

pub use completion::BatchFuture;

/// Bounds every submitted key satisfies
pub trait BatchKey: Eq + Hash + Clone + Debug + Send + 'static {}

impl<T> BatchKey for T where T: Eq + Hash + Clone + Debug + Send + 'static {}

/// Bounds every produced result satisfies.
///
/// `Clone` lets duplicate keys in one batch share the single mapped value.
pub trait BatchValue: Clone + Send + 'static {}

impl<T> BatchValue for T where T: Clone + Send + 'static {}

/// What a call to [`BatchCoordinator::dispose`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOutcome {
    /// An earlier call already disposed the coordinator
    AlreadyDisposed,
    /// Nothing was buffered
    Empty,
    /// The buffered requests were dispatched as a final batch
    Flushed(usize),
    /// The buffered requests were failed with `BatchError::Disposed`
    Failed(usize),
}

/// Handle to a batching engine
///
/// Cloning is cheap and every clone drives the same engine. When the last
/// clone is dropped the engine is disposed with the configured
/// [`DisposePolicy`].
///
/// ```rust
/// use batch_executor::{BatchConfig, BatchCoordinator};
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> batch_executor::Result<()> {
/// let coordinator = BatchCoordinator::new(
///     BatchConfig::new()
///         .with_max_batch_size(2)
///         .with_flush_interval(Duration::from_millis(10)),
///     |keys: Vec<u32>| async move {
///         Ok::<_, anyhow::Error>(keys.into_iter().map(|k| (k, k * 10)).collect::<HashMap<_, _>>())
///     },
/// )?;
///
/// let (a, b) = tokio::join!(coordinator.execute(1), coordinator.execute(2));
/// assert_eq!(a?, 10);
/// assert_eq!(b?, 20);
/// # Ok(())
/// # }
/// ```
pub struct BatchCoordinator<K: BatchKey, V: BatchValue> {
    inner: Arc<CoordinatorInner<K, V>>,
}

impl<K: BatchKey, V: BatchValue> Clone for BatchCoordinator<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<K: BatchKey, V: BatchValue> {
    config: BatchConfig,
    runtime: Handle,
    state: Mutex<CoordinatorState<K, V>>,
    dispatch: Arc<DispatchContext<K, V>>,
}

/// Everything guarded by the coordinator lock
struct CoordinatorState<K, V> {
    buffer: Buffer<K, V>,
    timer: Option<FlushTimer>,
    disposed: bool,
}

impl<K, V> CoordinatorState<K, V> {
    /// Detach the current buffer if it holds anything, disarming its timer
    fn detach(&mut self) -> Option<DetachedBatch<K, V>> {
        if self.buffer.is_empty() {
            return None;
        }

        let generation = self.buffer.generation();
        if let Some(timer) = self.timer.take() {
            if timer.generation() == generation {
                timer.disarm();
            } else {
                self.timer = Some(timer);
            }
        }

        Some(self.buffer.detach())
    }
}

impl<K: BatchKey, V: BatchValue> BatchCoordinator<K, V> {
    /// Create a coordinator on the current tokio runtime
    pub fn new<P>(config: BatchConfig, processor: P) -> Result<Self>
    where
        P: BatchProcessor<K, V>,
    {
        Self::builder()
            .config(config)
            .processor(processor)
            .build()
    }

    pub fn builder() -> BatchCoordinatorBuilder<K, V> {
        BatchCoordinatorBuilder::new()
    }

    /// Submit a key for batched processing.
    ///
    /// Returns immediately with a future for the key's result. Fails with
    /// [`BatchError::Closed`] once the coordinator has been disposed.
    pub fn submit(&self, key: K) -> Result<BatchFuture<V>> {
        CoordinatorInner::submit(&self.inner, key)
    }

    /// Submit a key and wait for its result
    pub async fn execute(&self, key: K) -> Result<V> {
        self.submit(key)?.await
    }

    /// Dispatch the current buffer now, returning how many requests it held
    pub fn flush(&self) -> usize {
        self.inner.flush(FlushTrigger::Manual)
    }

    /// Stop accepting submissions and settle the pending buffer.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn dispose(&self) -> DisposeOutcome {
        self.inner.dispose()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Number of requests waiting in the current buffer
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> BatchStatsSnapshot {
        self.inner.dispatch.stats.snapshot()
    }
}

impl<K: BatchKey, V: BatchValue> Debug for BatchCoordinator<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BatchCoordinator")
            .field("name", &self.inner.config.name)
            .field("generation", &state.buffer.generation())
            .field("pending", &state.buffer.len())
            .field("timer_armed", &state.timer.is_some())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<K: BatchKey, V: BatchValue> CoordinatorInner<K, V> {
    fn submit(this: &Arc<Self>, key: K) -> Result<BatchFuture<V>> {
        let (future, detached) = {
            let mut state = this.state.lock();
            if state.disposed {
                drop(state);
                this.dispatch.stats.record_rejected();
                return Err(BatchError::closed(&this.config.name));
            }

            let (request, future) = PendingRequest::new(key);
            let len = state.buffer.push(request);

            let detached = if len >= this.config.max_batch_size {
                state.detach()
            } else {
                if len == 1 {
                    let generation = state.buffer.generation();
                    Self::arm_timer(this, &mut state, generation);
                }
                None
            };

            (future, detached)
        };

        this.dispatch.stats.record_submitted();
        this.dispatch.metrics.record_submitted();

        if let Some(batch) = detached {
            this.spawn_batch(batch, FlushTrigger::Size);
        }

        Ok(future)
    }

    fn arm_timer(this: &Arc<Self>, state: &mut CoordinatorState<K, V>, generation: u64) {
        let weak = Arc::downgrade(this);
        let timer = FlushTimer::arm(
            &this.runtime,
            generation,
            this.config.flush_interval(),
            move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_timer_expired(generation);
                }
            },
        );

        debug!(
            coordinator = %this.config.name,
            generation,
            interval_ms = this.config.flush_interval_ms,
            "Flush timer armed"
        );

        if let Some(previous) = state.timer.replace(timer) {
            previous.disarm();
        }
    }

    fn on_timer_expired(&self, generation: u64) {
        let detached = {
            let mut state = self.state.lock();
            if state
                .timer
                .as_ref()
                .is_some_and(|timer| timer.generation() == generation)
            {
                state.timer = None;
            }

            if state.disposed || state.buffer.generation() != generation {
                None
            } else {
                state.detach()
            }
        };

        match detached {
            Some(batch) => self.spawn_batch(batch, FlushTrigger::Timer),
            None => debug!(
                coordinator = %self.config.name,
                generation,
                "Flush timer fired for an already detached buffer"
            ),
        }
    }

    fn flush(&self, trigger: FlushTrigger) -> usize {
        let detached = {
            let mut state = self.state.lock();
            if state.disposed {
                return 0;
            }
            state.detach()
        };

        match detached {
            Some(batch) => {
                let size = batch.len();
                self.spawn_batch(batch, trigger);
                size
            }
            None => 0,
        }
    }

    fn dispose(&self) -> DisposeOutcome {
        let detached = {
            let mut state = self.state.lock();
            if state.disposed {
                return DisposeOutcome::AlreadyDisposed;
            }
            state.disposed = true;

            let detached = state.detach();
            if let Some(timer) = state.timer.take() {
                timer.disarm();
            }
            detached
        };

        let outcome = match (detached, self.config.dispose_policy) {
            (None, _) => DisposeOutcome::Empty,
            (Some(batch), DisposePolicy::Flush) => {
                let size = batch.len();
                self.spawn_batch(batch, FlushTrigger::Dispose);
                DisposeOutcome::Flushed(size)
            }
            (Some(batch), DisposePolicy::FailPending) => {
                let size = batch.len();
                self.dispatch.stats.record_disposed_pending(size);
                self.dispatch.metrics.record_requests_failed(size);
                dispatch::fail_all(
                    batch.into_requests(),
                    &BatchError::disposed(&self.config.name),
                );
                DisposeOutcome::Failed(size)
            }
        };

        info!(
            coordinator = %self.config.name,
            policy = %self.config.dispose_policy,
            outcome = ?outcome,
            "Coordinator disposed"
        );

        outcome
    }

    fn spawn_batch(&self, batch: DetachedBatch<K, V>, trigger: FlushTrigger) {
        let batch_size = batch.len();
        self.dispatch.stats.record_dispatch(trigger, batch_size);
        self.dispatch.metrics.record_dispatch(trigger, batch_size);

        debug!(
            coordinator = %self.config.name,
            generation = batch.generation(),
            batch_size,
            trigger = %trigger,
            "Buffer detached for processing"
        );

        self.runtime.spawn(dispatch::run_batch(
            Arc::clone(&self.dispatch),
            batch,
            trigger,
        ));
    }
}

impl<K: BatchKey, V: BatchValue> Drop for CoordinatorInner<K, V> {
    fn drop(&mut self) {
        if !self.state.get_mut().disposed {
            self.dispose();
        }
    }
}

/// Fluent construction for [`BatchCoordinator`]
pub struct BatchCoordinatorBuilder<K, V> {
    config: BatchConfig,
    processor: Option<Arc<dyn BatchProcessor<K, V>>>,
    runtime: Option<Handle>,
}

impl<K, V> Default for BatchCoordinatorBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> BatchCoordinatorBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            config: BatchConfig::default(),
            processor: None,
            runtime: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.config.max_batch_size = max_batch_size;
        self
    }

    pub fn flush_interval(mut self, interval: std::time::Duration) -> Self {
        self.config = self.config.with_flush_interval(interval);
        self
    }

    pub fn dispose_policy(mut self, policy: DisposePolicy) -> Self {
        self.config.dispose_policy = policy;
        self
    }

    pub fn processor<P: BatchProcessor<K, V>>(mut self, processor: P) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    /// Drive timers and dispatch on this runtime instead of the current one
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

impl<K: BatchKey, V: BatchValue> BatchCoordinatorBuilder<K, V> {
    pub fn build(self) -> Result<BatchCoordinator<K, V>> {
        self.config.validate()?;

        let processor = self.processor.ok_or_else(|| {
            ConfigurationError::invalid_value("processor", "none", "a processing function is required")
        })?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| BatchError::runtime(e.to_string()))?,
        };

        let dispatch = Arc::new(DispatchContext {
            name: self.config.name.clone(),
            processor,
            stats: Arc::new(BatchStats::new()),
            metrics: BatchMetricsRecorder::new(self.config.name.clone()),
        });

        debug!(
            coordinator = %self.config.name,
            max_batch_size = self.config.max_batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            dispose_policy = %self.config.dispose_policy,
            "Batch coordinator created"
        );

        let inner = CoordinatorInner {
            state: Mutex::new(CoordinatorState {
                buffer: Buffer::new(0, self.config.max_batch_size.min(1024)),
                timer: None,
                disposed: false,
            }),
            config: self.config,
            runtime,
            dispatch,
        };

        Ok(BatchCoordinator {
            inner: Arc::new(inner),
        })
    }
}
