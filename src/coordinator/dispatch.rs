//! Processing invocation and per-request fan-out for a detached batch.

use futures::FutureExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::buffer::{DetachedBatch, PendingRequest};
use super::{BatchKey, BatchValue};
use crate::error::BatchError;
use crate::metrics::BatchMetricsRecorder;
use crate::processor::BatchProcessor;
use crate::stats::{BatchStats, FlushTrigger};

/// Everything a flush needs once the coordinator lock has been released
pub(crate) struct DispatchContext<K, V> {
    pub(crate) name: String,
    pub(crate) processor: Arc<dyn BatchProcessor<K, V>>,
    pub(crate) stats: Arc<BatchStats>,
    pub(crate) metrics: BatchMetricsRecorder,
}

/// Counts of how a successful batch was resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanOutSummary {
    pub(crate) succeeded: usize,
    pub(crate) missing: usize,
}

/// Run the processing function for `batch` and resolve every request in it
pub(crate) async fn run_batch<K, V>(
    context: Arc<DispatchContext<K, V>>,
    batch: DetachedBatch<K, V>,
    trigger: FlushTrigger,
) where
    K: BatchKey,
    V: BatchValue,
{
    let generation = batch.generation();
    let batch_size = batch.len();
    let keys = batch.keys();
    let started = Instant::now();

    let outcome = AssertUnwindSafe(context.processor.process(keys))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic.as_ref()))));

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    context.metrics.record_processing_time(elapsed_ms);

    match outcome {
        Ok(results) => {
            let summary = fan_out(&context.name, results, batch.into_requests());
            context
                .stats
                .record_batch_resolved(summary.succeeded, summary.missing);
            context.metrics.record_requests_failed(summary.missing);

            debug!(
                coordinator = %context.name,
                generation,
                batch_size,
                trigger = %trigger,
                succeeded = summary.succeeded,
                missing = summary.missing,
                elapsed_ms,
                "Batch resolved"
            );
        }
        Err(cause) => {
            warn!(
                coordinator = %context.name,
                generation,
                batch_size,
                trigger = %trigger,
                error = %cause,
                "Batch processing failed; failing every request in the batch"
            );

            context.stats.record_batch_failed(batch_size);
            context.metrics.record_batch_failed(batch_size);
            fail_all(batch.into_requests(), &BatchError::processing_failed(cause));
        }
    }
}

/// Resolve each request with the value mapped to its key.
///
/// Requests whose key is absent from `results` fail individually.
pub(crate) fn fan_out<K, V>(
    name: &str,
    results: HashMap<K, V>,
    requests: Vec<PendingRequest<K, V>>,
) -> FanOutSummary
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    let mut summary = FanOutSummary::default();

    for request in requests {
        match results.get(request.key()) {
            Some(value) => {
                summary.succeeded += 1;
                request.resolve(Ok(value.clone()));
            }
            None => {
                summary.missing += 1;
                warn!(
                    coordinator = %name,
                    key = ?request.key(),
                    "Processing function produced no result for key"
                );
                let error = BatchError::missing_result(request.key());
                request.resolve(Err(error));
            }
        }
    }

    summary
}

/// Resolve every request with a clone of the same error
pub(crate) fn fail_all<K, V>(requests: Vec<PendingRequest<K, V>>, error: &BatchError) {
    for request in requests {
        request.resolve(Err(error.clone()));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("processing function panicked: {detail}")
}
