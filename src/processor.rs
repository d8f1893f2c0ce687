//! # Batch Processor
//!
//! The single external collaborator of a coordinator: an asynchronous bulk
//! operation that maps an ordered sequence of keys to a key → result mapping.
//!
//! Implementations receive keys in acceptance order with duplicates kept.
//! On success they should produce an entry for every key they were handed;
//! any key left out fails only the requests submitted with it. Returning
//! `Err` fails the whole batch.
//!
//! Async closures get a blanket implementation, so most callers never name
//! the trait:
//!
//! ```rust
//! use batch_executor::BatchProcessor;
//! use std::collections::HashMap;
//!
//! fn assert_processor<P: BatchProcessor<u32, String>>(_: &P) {}
//!
//! let processor = |keys: Vec<u32>| async move {
//!     Ok::<_, anyhow::Error>(keys.into_iter().map(|k| (k, k.to_string())).collect::<HashMap<_, _>>())
//! };
//! assert_processor(&processor);
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;

/// Bulk processing function invoked once per flushed batch
#[async_trait]
pub trait BatchProcessor<K, V>: Send + Sync + 'static {
    /// Process one batch of keys
    async fn process(&self, keys: Vec<K>) -> anyhow::Result<HashMap<K, V>>;
}

#[async_trait]
impl<K, V, F, Fut> BatchProcessor<K, V> for F
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<HashMap<K, V>>> + Send,
{
    async fn process(&self, keys: Vec<K>) -> anyhow::Result<HashMap<K, V>> {
        (self)(keys).await
    }
}
