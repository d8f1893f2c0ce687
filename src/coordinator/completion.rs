//! Caller-side completion handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::{BatchError, Result};

/// Future returned by [`BatchCoordinator::submit`](crate::BatchCoordinator::submit)
///
/// Resolves once with the value the processing function produced for the
/// submitted key, or with the error that failed the request. If the request
/// is dropped without being resolved (for example because the runtime shut
/// down mid-batch) it resolves to [`BatchError::Abandoned`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct BatchFuture<V> {
    receiver: oneshot::Receiver<Result<V>>,
}

impl<V> BatchFuture<V> {
    pub(crate) fn new(receiver: oneshot::Receiver<Result<V>>) -> Self {
        Self { receiver }
    }
}

impl<V> Future for BatchFuture<V> {
    type Output = Result<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BatchError::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}
