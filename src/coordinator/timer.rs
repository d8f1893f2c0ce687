//! Flush timer armed for a single buffer generation.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// A countdown that calls back with the generation it was armed for
#[derive(Debug)]
pub(crate) struct FlushTimer {
    generation: u64,
    handle: AbortHandle,
}

impl FlushTimer {
    /// Spawn the countdown on `runtime`; `on_expiry` receives `generation`
    ///
    /// The deadline is fixed at the moment of arming, not when the runtime
    /// first polls the spawned task.
    pub(crate) fn arm<F>(runtime: &Handle, generation: u64, interval: Duration, on_expiry: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let deadline = Instant::now() + interval;
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expiry(generation);
        });

        Self {
            generation,
            handle: task.abort_handle(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the countdown; a no-op if it has already fired
    pub(crate) fn disarm(self) {
        self.handle.abort();
    }
}
