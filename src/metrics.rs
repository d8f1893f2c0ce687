//! # Batch Metrics
//!
//! OpenTelemetry instruments for batch dispatch and resolution.
//!
//! Instruments come from the global meter provider, so they are no-ops
//! unless the host application installs one.
//!
//! Labels:
//! - coordinator: Coordinator name from `BatchConfig::name`
//! - trigger: Flush trigger (size, timer, manual, dispose)

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

use crate::stats::FlushTrigger;

static BATCH_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    BATCH_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("batch-executor"))
}

/// Total number of requests accepted by `submit`
pub fn requests_submitted() -> Counter<u64> {
    meter()
        .u64_counter("batch_executor.requests.submitted")
        .with_description("Total number of requests accepted for batching")
        .build()
}

/// Total number of batches handed to the processor
pub fn batches_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("batch_executor.batches.dispatched")
        .with_description("Total number of batches handed to the processing function")
        .build()
}

/// Total number of batches whose processing function returned an error
pub fn batches_failed() -> Counter<u64> {
    meter()
        .u64_counter("batch_executor.batches.failed")
        .with_description("Total number of batches failed by the processing function")
        .build()
}

/// Total number of individual requests resolved with an error
pub fn requests_failed() -> Counter<u64> {
    meter()
        .u64_counter("batch_executor.requests.failed")
        .with_description("Total number of requests resolved with an error")
        .build()
}

/// Distribution of dispatched batch sizes
pub fn batch_size() -> Histogram<u64> {
    meter()
        .u64_histogram("batch_executor.batch.size")
        .with_description("Number of requests per dispatched batch")
        .build()
}

/// Processing function latency per batch
pub fn batch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("batch_executor.batch.duration_ms")
        .with_description("Processing function latency per batch in milliseconds")
        .with_unit("ms")
        .build()
}

/// Recorder holding pre-built instruments for one coordinator
#[derive(Clone)]
pub struct BatchMetricsRecorder {
    coordinator: String,
    submitted: Counter<u64>,
    dispatched: Counter<u64>,
    failed_batches: Counter<u64>,
    failed_requests: Counter<u64>,
    sizes: Histogram<u64>,
    durations: Histogram<f64>,
}

impl std::fmt::Debug for BatchMetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchMetricsRecorder")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl BatchMetricsRecorder {
    pub fn new(coordinator: impl Into<String>) -> Self {
        Self {
            coordinator: coordinator.into(),
            submitted: requests_submitted(),
            dispatched: batches_dispatched(),
            failed_batches: batches_failed(),
            failed_requests: requests_failed(),
            sizes: batch_size(),
            durations: batch_duration_ms(),
        }
    }

    fn labels(&self) -> [KeyValue; 1] {
        [KeyValue::new("coordinator", self.coordinator.clone())]
    }

    pub fn record_submitted(&self) {
        self.submitted.add(1, &self.labels());
    }

    pub fn record_dispatch(&self, trigger: FlushTrigger, batch_size: usize) {
        let labels = [
            KeyValue::new("coordinator", self.coordinator.clone()),
            KeyValue::new("trigger", trigger.as_str()),
        ];
        self.dispatched.add(1, &labels);
        self.sizes.record(batch_size as u64, &labels);
    }

    pub fn record_processing_time(&self, duration_ms: f64) {
        self.durations.record(duration_ms, &self.labels());
    }

    pub fn record_batch_failed(&self, batch_size: usize) {
        self.failed_batches.add(1, &self.labels());
        self.failed_requests.add(batch_size as u64, &self.labels());
    }

    pub fn record_requests_failed(&self, count: usize) {
        if count > 0 {
            self.failed_requests.add(count as u64, &self.labels());
        }
    }
}
