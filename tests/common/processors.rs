//! Processing functions used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use batch_executor::BatchProcessor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Maps each key to its string form after a short delay, recording batch sizes
#[derive(Clone, Default)]
pub struct StringifyProcessor {
    pub delay: Duration,
    pub batch_sizes: Arc<Mutex<Vec<usize>>>,
}

impl StringifyProcessor {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().clone()
    }
}

#[async_trait]
impl BatchProcessor<u32, String> for StringifyProcessor {
    async fn process(&self, keys: Vec<u32>) -> anyhow::Result<HashMap<u32, String>> {
        self.batch_sizes.lock().push(keys.len());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(keys.into_iter().map(|k| (k, k.to_string())).collect())
    }
}

/// Always fails after a short delay
#[derive(Clone)]
pub struct FailingProcessor {
    pub delay: Duration,
    pub message: &'static str,
}

#[async_trait]
impl BatchProcessor<u32, String> for FailingProcessor {
    async fn process(&self, _keys: Vec<u32>) -> anyhow::Result<HashMap<u32, String>> {
        tokio::time::sleep(self.delay).await;
        Err(anyhow::anyhow!(self.message))
    }
}
