//! Bounded-concurrency fan-out with per-attempt timeout and retry.
//!
//! [`BatchProcessor::run`] takes keyed work items and drives them through a
//! continuously refilling window of at most `max_concurrency` in-flight
//! futures. Each item is retried with exponential backoff until it succeeds
//! or its retry budget is spent. Failures are captured per key; a run only
//! fails as a whole when its input is malformed.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub const TIMEOUT_MESSAGE: &str = "Request timeout";

/// Exponential backoff between attempts: `base * 2^(retry-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(5000),
        }
    }
}

impl Backoff {
    /// Delay to wait before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of items in flight at once.
    pub max_concurrency: usize,
    /// Additional attempts after the first failure.
    pub retry_attempts: u32,
    /// Budget for a single attempt.
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            retry_attempts: 2,
            timeout: Duration::from_secs(10),
            backoff: Backoff::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult<R> {
    pub success: bool,
    pub data: Option<R>,
    pub error: Option<String>,
    /// From the first attempt to the final outcome, backoff included.
    pub duration: Duration,
    pub retries: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("duplicate batch key: {0}")]
    DuplicateKey(String),
}

#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Processes every item and returns one [`BatchResult`] per key.
    ///
    /// Keys must be unique; duplicates are rejected before any work starts.
    pub async fn run<K, T, R, E, F, Fut>(
        &self,
        items: Vec<(K, T)>,
        process: F,
    ) -> Result<HashMap<K, BatchResult<R>>, BatchError>
    where
        K: Eq + Hash + Clone + Debug,
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: Display,
    {
        let mut seen = HashSet::with_capacity(items.len());
        for (key, _) in &items {
            if !seen.insert(key) {
                return Err(BatchError::DuplicateKey(format!("{key:?}")));
            }
        }

        let total = items.len();
        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            items = total,
            max_concurrency = self.config.max_concurrency,
            "Processing batch"
        );

        let process = &process;
        let results: HashMap<K, BatchResult<R>> = stream::iter(items)
            .map(|(key, item)| async move {
                let result = self.process_item(&key, item, process).await;
                (key, result)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let succeeded = results.values().filter(|r| r.success).count();
        let success_rate = if total == 0 {
            100
        } else {
            succeeded * 100 / total
        };
        info!(
            %batch_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            succeeded,
            failed = total - succeeded,
            success_rate,
            "Batch completed"
        );

        Ok(results)
    }

    async fn process_item<K, T, R, E, F, Fut>(&self, key: &K, item: T, process: &F) -> BatchResult<R>
    where
        K: Debug,
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: Display,
    {
        let started = Instant::now();
        let mut retries = 0;

        loop {
            let outcome = tokio::time::timeout(self.config.timeout, process(item.clone())).await;

            let error = match outcome {
                Ok(Ok(data)) => {
                    return BatchResult {
                        success: true,
                        data: Some(data),
                        error: None,
                        duration: started.elapsed(),
                        retries,
                    };
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => TIMEOUT_MESSAGE.to_string(),
            };

            if retries >= self.config.retry_attempts {
                debug!(?key, retries, %error, "Batch item failed");
                return BatchResult {
                    success: false,
                    data: None,
                    error: Some(error),
                    duration: started.elapsed(),
                    retries,
                };
            }

            retries += 1;
            let delay = self.config.backoff.delay(retries);
            debug!(?key, retry = retries, delay_ms = delay.as_millis() as u64, %error, "Retrying batch item");
            tokio::time::sleep(delay).await;
        }
    }
}
