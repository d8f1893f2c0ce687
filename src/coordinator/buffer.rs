//! Pending requests and the generation-tagged buffer they accumulate in.
//!
//! A [`Buffer`] is the only collection that accepts new requests. Detaching
//! it swaps in an empty buffer with the next generation number and hands the
//! old contents out as a [`DetachedBatch`], which has no way to grow again.

use std::mem;
use tokio::sync::oneshot;

use super::completion::BatchFuture;
use crate::error::Result;

/// One caller's outstanding submission
pub(crate) struct PendingRequest<K, V> {
    key: K,
    responder: oneshot::Sender<Result<V>>,
}

impl<K, V> PendingRequest<K, V> {
    /// Create a request together with the caller's half of its completion handle
    pub(crate) fn new(key: K) -> (Self, BatchFuture<V>) {
        let (responder, receiver) = oneshot::channel();
        (Self { key, responder }, BatchFuture::new(receiver))
    }

    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Resolve the completion handle, consuming it.
    ///
    /// Returns false when the caller already dropped its future.
    pub(crate) fn resolve(self, outcome: Result<V>) -> bool {
        self.responder.send(outcome).is_ok()
    }
}

/// The current, growing buffer
pub(crate) struct Buffer<K, V> {
    generation: u64,
    capacity_hint: usize,
    requests: Vec<PendingRequest<K, V>>,
}

impl<K, V> Buffer<K, V> {
    pub(crate) fn new(generation: u64, capacity_hint: usize) -> Self {
        Self {
            generation,
            capacity_hint,
            requests: Vec::with_capacity(capacity_hint),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Append a request, returning the new length
    pub(crate) fn push(&mut self, request: PendingRequest<K, V>) -> usize {
        self.requests.push(request);
        self.requests.len()
    }

    /// Swap this buffer's contents out for an empty next-generation buffer
    pub(crate) fn detach(&mut self) -> DetachedBatch<K, V> {
        let next = Buffer::new(self.generation + 1, self.capacity_hint);
        let previous = mem::replace(self, next);
        DetachedBatch {
            generation: previous.generation,
            requests: previous.requests,
        }
    }
}

/// A buffer that has been swapped out and is owned by exactly one flush
pub(crate) struct DetachedBatch<K, V> {
    generation: u64,
    requests: Vec<PendingRequest<K, V>>,
}

impl<K: Clone, V> DetachedBatch<K, V> {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }

    /// Keys in acceptance order, duplicates included
    pub(crate) fn keys(&self) -> Vec<K> {
        self.requests.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn into_requests(self) -> Vec<PendingRequest<K, V>> {
        self.requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_keys(buffer: &mut Buffer<u32, String>, keys: &[u32]) -> Vec<BatchFuture<String>> {
        keys.iter()
            .map(|&k| {
                let (request, future) = PendingRequest::new(k);
                buffer.push(request);
                future
            })
            .collect()
    }

    #[test]
    fn test_detach_swaps_in_next_generation() {
        let mut buffer = Buffer::new(0, 4);
        let _futures = push_keys(&mut buffer, &[3, 1, 3]);
        assert_eq!(buffer.len(), 3);

        let batch = buffer.detach();
        assert_eq!(batch.generation(), 0);
        assert_eq!(batch.keys(), vec![3, 1, 3]);

        assert!(buffer.is_empty());
        assert_eq!(buffer.generation(), 1);
    }

    #[test]
    fn test_detached_batches_never_overlap() {
        let mut buffer = Buffer::new(0, 2);
        let _first = push_keys(&mut buffer, &[1, 2]);
        let a = buffer.detach();
        let _second = push_keys(&mut buffer, &[3]);
        let b = buffer.detach();

        assert_eq!(a.keys(), vec![1, 2]);
        assert_eq!(b.keys(), vec![3]);
        assert_eq!(b.generation(), a.generation() + 1);
    }

    #[test]
    fn test_resolve_after_caller_dropped_is_harmless() {
        let (request, future) = PendingRequest::<u32, String>::new(9);
        drop(future);
        assert!(!request.resolve(Ok("9".to_string())));
    }
}
