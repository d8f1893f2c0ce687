//! # Coordinator Unit Tests
//!
//! Timing-sensitive behavior runs on a paused tokio clock so flush deadlines
//! can be asserted exactly.
//!
//! ## Test Coverage
//!
//! - Size trigger short-circuits the timer
//! - Timer trigger flushes an under-threshold buffer after the interval
//! - A timer armed for an already detached buffer never flushes its successor
//! - Timer deadlines count from arming, not from the first poll
//! - Manual flush, duplicate keys, missing keys
//! - Both disposal policies, idempotent disposal, dispose-on-drop

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{advance, sleep, Instant};
use tokio_test::{assert_pending, assert_ready};

use super::*;

/// Processor that records every batch it receives and maps `k -> k.to_string()`
#[derive(Clone, Default)]
struct RecordingProcessor {
    batches: Arc<Mutex<Vec<Vec<u32>>>>,
}

impl RecordingProcessor {
    fn batches(&self) -> Vec<Vec<u32>> {
        self.batches.lock().clone()
    }
}

#[async_trait]
impl BatchProcessor<u32, String> for RecordingProcessor {
    async fn process(&self, keys: Vec<u32>) -> anyhow::Result<HashMap<u32, String>> {
        self.batches.lock().push(keys.clone());
        Ok(keys.into_iter().map(|k| (k, k.to_string())).collect())
    }
}

fn coordinator(
    max_batch_size: usize,
    interval_ms: u64,
    policy: DisposePolicy,
) -> (BatchCoordinator<u32, String>, RecordingProcessor) {
    let processor = RecordingProcessor::default();
    let coordinator = BatchCoordinator::builder()
        .name("unit-test")
        .max_batch_size(max_batch_size)
        .flush_interval(Duration::from_millis(interval_ms))
        .dispose_policy(policy)
        .processor(processor.clone())
        .build()
        .unwrap();
    (coordinator, processor)
}

#[tokio::test(start_paused = true)]
async fn test_size_trigger_flushes_without_waiting_for_timer() {
    let (coordinator, processor) = coordinator(3, 10_000, DisposePolicy::Flush);
    let started = Instant::now();

    let futures: Vec<_> = (0..3).map(|k| coordinator.submit(k).unwrap()).collect();
    assert_eq!(coordinator.pending_len(), 0);

    let results = futures::future::try_join_all(futures).await.unwrap();
    assert_eq!(results, vec!["0", "1", "2"]);
    assert!(started.elapsed() < Duration::from_millis(10_000));

    assert_eq!(processor.batches(), vec![vec![0, 1, 2]]);
    let stats = coordinator.stats();
    assert_eq!(stats.size_flushes, 1);
    assert_eq!(stats.timer_flushes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timer_flushes_under_threshold_buffer_after_interval() {
    let (coordinator, processor) = coordinator(500, 100, DisposePolicy::Flush);
    let started = Instant::now();

    let mut future = tokio_test::task::spawn(coordinator.submit(1).unwrap());
    assert_pending!(future.poll());

    advance(Duration::from_millis(99)).await;
    assert_pending!(future.poll());
    assert!(processor.batches().is_empty());

    let result = future.await.unwrap();
    assert_eq!(result, "1");
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100) && elapsed <= Duration::from_millis(101));
    assert_eq!(coordinator.stats().timer_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_does_not_flush_next_buffer_early() {
    let (coordinator, processor) = coordinator(2, 50, DisposePolicy::Flush);

    // Arms the timer for generation 0, then fills the buffer
    let first = coordinator.submit(1).unwrap();
    let second = coordinator.submit(2).unwrap();
    assert_eq!(first.await.unwrap(), "1");
    assert_eq!(second.await.unwrap(), "2");

    sleep(Duration::from_millis(30)).await;
    let submitted_at = Instant::now();
    let mut third = tokio_test::task::spawn(coordinator.submit(3).unwrap());

    // The generation 0 deadline passes here and must not touch generation 1
    sleep(Duration::from_millis(30)).await;
    assert_pending!(third.poll());
    assert_eq!(coordinator.pending_len(), 1);

    assert_eq!(third.await.unwrap(), "3");
    let waited = submitted_at.elapsed();
    assert!(waited >= Duration::from_millis(50) && waited <= Duration::from_millis(51));
    assert_eq!(processor.batches(), vec![vec![1, 2], vec![3]]);

    let stats = coordinator.stats();
    assert_eq!(stats.size_flushes, 1);
    assert_eq!(stats.timer_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_deadline_is_not_delayed_by_scheduling() {
    let (coordinator, processor) = coordinator(500, 100, DisposePolicy::Flush);
    let started = Instant::now();

    let mut future = tokio_test::task::spawn(coordinator.submit(1).unwrap());
    assert_pending!(future.poll());

    // Jump past the deadline without letting the runtime idle
    advance(Duration::from_millis(150)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(processor.batches(), vec![vec![1]]);
    assert!(future.is_woken());
    assert_eq!(assert_ready!(future.poll()).unwrap(), "1");
    assert_eq!(started.elapsed(), Duration::from_millis(150));
    assert_eq!(coordinator.stats().timer_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_fired_timer_for_detached_generation_is_ignored() {
    let (coordinator, processor) = coordinator(2, 50, DisposePolicy::Flush);

    // Generation 0 is detached by the size trigger
    let first = coordinator.submit(1).unwrap();
    let second = coordinator.submit(2).unwrap();
    let mut third = tokio_test::task::spawn(coordinator.submit(3).unwrap());
    assert_eq!(coordinator.pending_len(), 1);

    // A generation 0 expiry that raced the size trigger to the lock
    coordinator.inner.on_timer_expired(0);

    assert_eq!(coordinator.pending_len(), 1);
    assert_eq!(coordinator.stats().timer_flushes, 0);
    assert_eq!(coordinator.stats().batches_dispatched, 1);

    assert_eq!(first.await.unwrap(), "1");
    assert_eq!(second.await.unwrap(), "2");
    assert_pending!(third.poll());
    assert_eq!(processor.batches(), vec![vec![1, 2]]);

    // The generation 1 timer is still armed and flushes on its own deadline
    assert_eq!(third.await.unwrap(), "3");
    assert_eq!(processor.batches(), vec![vec![1, 2], vec![3]]);
    assert_eq!(coordinator.stats().timer_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_remainder_is_flushed_by_timer() {
    let (coordinator, processor) = coordinator(5, 50, DisposePolicy::Flush);

    let futures: Vec<_> = (0..17).map(|k| coordinator.submit(k).unwrap()).collect();
    let results = futures::future::try_join_all(futures).await.unwrap();

    let expected: Vec<String> = (0..17).map(|k| k.to_string()).collect();
    assert_eq!(results, expected);

    let batches = processor.batches();
    assert_eq!(batches.len(), 4);
    assert_eq!(batches[3], vec![15, 16]);
    assert!(batches.iter().all(|b| b.len() <= 5));
}

#[tokio::test(start_paused = true)]
async fn test_manual_flush_detaches_current_buffer() {
    let (coordinator, processor) = coordinator(10, 10_000, DisposePolicy::Flush);

    assert_eq!(coordinator.flush(), 0);

    let a = coordinator.submit(7).unwrap();
    let b = coordinator.submit(8).unwrap();
    assert_eq!(coordinator.flush(), 2);
    assert_eq!(coordinator.pending_len(), 0);

    assert_eq!(a.await.unwrap(), "7");
    assert_eq!(b.await.unwrap(), "8");

    // The disarmed timer must not produce a second, empty dispatch
    sleep(Duration::from_millis(20_000)).await;
    assert_eq!(processor.batches(), vec![vec![7, 8]]);
    assert_eq!(coordinator.stats().manual_flushes, 1);
    assert_eq!(coordinator.stats().batches_dispatched, 1);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_keys_are_passed_through_in_order() {
    let (coordinator, processor) = coordinator(4, 50, DisposePolicy::Flush);

    let futures: Vec<_> = [5, 5, 6, 5]
        .into_iter()
        .map(|k| coordinator.submit(k).unwrap())
        .collect();
    let results = futures::future::try_join_all(futures).await.unwrap();

    assert_eq!(results, vec!["5", "5", "6", "5"]);
    assert_eq!(processor.batches(), vec![vec![5, 5, 6, 5]]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_fails_only_that_request() {
    let coordinator = BatchCoordinator::new(
        BatchConfig::new().with_max_batch_size(4),
        |keys: Vec<u32>| async move {
            Ok::<_, anyhow::Error>(
                keys.into_iter()
                    .filter(|k| k % 2 == 0)
                    .map(|k| (k, k * 100))
                    .collect::<HashMap<_, _>>(),
            )
        },
    )
    .unwrap();

    let futures: Vec<_> = (0..4).map(|k| coordinator.submit(k).unwrap()).collect();
    let outcomes = futures::future::join_all(futures).await;

    assert_eq!(outcomes[0].as_ref().unwrap(), &0);
    assert!(matches!(&outcomes[1], Err(BatchError::MissingResult { key }) if key == "1"));
    assert_eq!(outcomes[2].as_ref().unwrap(), &200);
    assert!(matches!(&outcomes[3], Err(BatchError::MissingResult { key }) if key == "3"));

    let stats = coordinator.stats();
    assert_eq!(stats.requests_succeeded, 2);
    assert_eq!(stats.missing_results, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_with_flush_policy_dispatches_pending_once() {
    let (coordinator, processor) = coordinator(10, 100, DisposePolicy::Flush);

    let futures: Vec<_> = (0..3).map(|k| coordinator.submit(k).unwrap()).collect();
    assert_eq!(coordinator.dispose(), DisposeOutcome::Flushed(3));

    let results = futures::future::try_join_all(futures).await.unwrap();
    assert_eq!(results, vec!["0", "1", "2"]);

    // Past the original deadline: the aborted timer must not flush again
    sleep(Duration::from_millis(500)).await;
    assert_eq!(processor.batches(), vec![vec![0, 1, 2]]);
    assert_eq!(coordinator.stats().dispose_flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_with_fail_policy_fails_pending() {
    let (coordinator, processor) = coordinator(10, 100, DisposePolicy::FailPending);

    let futures: Vec<_> = (0..3).map(|k| coordinator.submit(k).unwrap()).collect();
    assert_eq!(coordinator.dispose(), DisposeOutcome::Failed(3));

    for outcome in futures::future::join_all(futures).await {
        assert!(matches!(outcome, Err(BatchError::Disposed { ref name }) if name == "unit-test"));
    }

    sleep(Duration::from_millis(500)).await;
    assert!(processor.batches().is_empty());
    assert_eq!(coordinator.stats().disposed_pending, 3);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_is_idempotent_and_closes_submissions() {
    let (coordinator, processor) = coordinator(10, 100, DisposePolicy::Flush);

    assert_eq!(coordinator.dispose(), DisposeOutcome::Empty);
    assert_eq!(coordinator.dispose(), DisposeOutcome::AlreadyDisposed);
    assert!(coordinator.is_disposed());

    let err = coordinator.submit(1).unwrap_err();
    assert!(matches!(err, BatchError::Closed { .. }));
    assert!(matches!(
        coordinator.execute(2).await,
        Err(BatchError::Closed { .. })
    ));
    assert_eq!(coordinator.flush(), 0);

    sleep(Duration::from_millis(500)).await;
    assert!(processor.batches().is_empty());

    let stats = coordinator.stats();
    assert_eq!(stats.submitted, 0);
    assert_eq!(stats.rejected, 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_disposes_with_policy() {
    let (coordinator, processor) = coordinator(10, 10_000, DisposePolicy::Flush);
    let clone = coordinator.clone();

    let pending = coordinator.submit(42).unwrap();
    drop(coordinator);
    assert!(!clone.is_disposed());
    drop(clone);

    assert_eq!(pending.await.unwrap(), "42");
    assert_eq!(processor.batches(), vec![vec![42]]);
}

#[tokio::test(start_paused = true)]
async fn test_caller_dropping_future_does_not_disturb_batch() {
    let (coordinator, processor) = coordinator(2, 50, DisposePolicy::Flush);

    drop(coordinator.submit(1).unwrap());
    let kept = coordinator.submit(2).unwrap();

    assert_eq!(kept.await.unwrap(), "2");
    assert_eq!(processor.batches(), vec![vec![1, 2]]);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let result = BatchCoordinator::<u32, String>::builder()
        .max_batch_size(0)
        .processor(RecordingProcessor::default())
        .build();
    assert!(matches!(result, Err(BatchError::Configuration(_))));

    let result = BatchCoordinator::<u32, String>::builder().build();
    assert!(matches!(
        result,
        Err(BatchError::Configuration(ConfigurationError::InvalidValue { ref field, .. })) if field == "processor"
    ));
}

#[test]
fn test_construction_outside_runtime_fails() {
    let result = BatchCoordinator::new(BatchConfig::default(), RecordingProcessor::default());
    assert!(matches!(result, Err(BatchError::Runtime { .. })));
}

#[test]
fn test_explicit_runtime_handle() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let coordinator = BatchCoordinator::builder()
        .max_batch_size(2)
        .processor(RecordingProcessor::default())
        .runtime(runtime.handle().clone())
        .build()
        .unwrap();

    let a = coordinator.submit(1).unwrap();
    let b = coordinator.submit(2).unwrap();
    let results = runtime.block_on(async { futures::future::try_join(a, b).await.unwrap() });
    assert_eq!(results, ("1".to_string(), "2".to_string()));

    let mut debug = format!("{coordinator:?}");
    debug.make_ascii_lowercase();
    assert!(debug.contains("disposed: false"));
    drop(coordinator);
}

#[test]
fn test_poll_before_flush_is_pending() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let (coordinator, _processor) = coordinator(10, 50, DisposePolicy::FailPending);
    let mut future = tokio_test::task::spawn(coordinator.submit(1).unwrap());
    assert_pending!(future.poll());

    coordinator.dispose();
    let outcome = assert_ready!(future.poll());
    assert!(matches!(outcome, Err(BatchError::Disposed { .. })));
}
