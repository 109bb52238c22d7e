//! Batched fan-out over async workers
//!
//! `BatchFetcher` bounds how many requests hit an upstream at once: items
//! run in fixed-size batches, each batch fully in parallel, with a pause
//! between batches. The free functions name the three join semantics used
//! across the workspace.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use futures::future::{join_all, try_join_all};

use crate::config::SearchConfig;

/// Runs a worker over many items in bounded, delayed batches.
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    batch_size: usize,
    delay_between_batches: Duration,
}

impl BatchFetcher {
    /// Creates a fetcher; a batch size of zero is treated as one.
    pub fn new(batch_size: usize, delay_between_batches: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            delay_between_batches,
        }
    }

    /// Creates a fetcher from the search fan-out settings.
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.batch_size, config.batch_delay)
    }

    /// Applies `worker` to every item, returning results in input order.
    ///
    /// Each result is whatever the worker returns, so a failing item never
    /// aborts its siblings. The delay runs before each batch after the first.
    pub async fn map_concurrently<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut pending = items.into_iter().peekable();
        let mut batch_index = 0usize;

        while pending.peek().is_some() {
            if batch_index > 0 && !self.delay_between_batches.is_zero() {
                tokio::time::sleep(self.delay_between_batches).await;
            }

            let batch: Vec<_> = pending.by_ref().take(self.batch_size).map(&worker).collect();
            tracing::debug!(
                "Running batch {} with {} items ({} total)",
                batch_index + 1,
                batch.len(),
                total
            );
            results.extend(join_all(batch).await);
            batch_index += 1;
        }

        results
    }
}

/// Awaits every future and returns every outcome in order.
pub async fn settle_all<I, T, E>(futures: I) -> Vec<Result<T, E>>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
{
    join_all(futures).await
}

/// Awaits every future, aborting on the first error.
///
/// # Errors
///
/// Returns the first error produced; remaining futures are dropped.
pub async fn fail_fast<I, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
{
    try_join_all(futures).await
}

/// Keeps successful outcomes and logs each failure.
pub fn collect_successes<T, E: Display>(context: &str, results: Vec<Result<T, E>>) -> Vec<T> {
    let mut successes = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => successes.push(value),
            Err(e) => tracing::warn!("{}: {}", context, e),
        }
    }
    successes
}
