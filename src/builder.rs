//! Builder for cached computations.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::expander::CacheExpander;
use std::future::Future;
use std::time::Duration;

/// Fluent configuration of one [`CacheExpander::get_or_compute`] call.
///
/// # Example
///
/// ```ignore
/// let bytes = expander
///     .builder("getAllBooks-1-3")
///     .with_tag("booksCache")
///     .with_ttl(Duration::from_secs(300))
///     .with_retry(3)
///     .execute(|| async { render_books().await })
///     .await?;
/// ```
pub struct CacheOperationBuilder<'a, B: CacheBackend> {
    expander: &'a CacheExpander<B>,
    key: String,
    tags: Vec<String>,
    ttl_override: Option<Duration>,
    retry_count: u32,
}

impl<'a, B: CacheBackend> CacheOperationBuilder<'a, B> {
    pub(crate) fn new(expander: &'a CacheExpander<B>, key: String) -> Self {
        Self {
            expander,
            key,
            tags: Vec::new(),
            ttl_override: None,
            retry_count: 0,
        }
    }

    /// Attach a tag; invalidating it discards the entry.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Override the expander's TTL policy for this entry.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// Retry a failing computation up to `count` times.
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Serve the entry from cache or run `compute`.
    ///
    /// # Errors
    ///
    /// Cache read failures are returned immediately. A failing computation
    /// is retried with exponential backoff (100ms, 200ms, 400ms, ...) and the
    /// last error is returned once retries run out; errors are never cached.
    pub async fn execute<F, Fut>(self, compute: F) -> Result<Vec<u8>>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Vec<u8>>> + Send,
    {
        let ttl = self
            .ttl_override
            .or_else(|| self.expander.ttl_policy.get_ttl());
        let attempt = compute_with_retry(compute, self.retry_count);

        self.expander
            .get_or_compute(&self.key, &self.tags, ttl, attempt)
            .await
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pause after failed attempt `attempt` (1-based): 100ms doubling, capped.
fn backoff(attempt: u32) -> Duration {
    let factor = 2_u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(100_u64.saturating_mul(factor)).min(MAX_BACKOFF)
}

async fn compute_with_retry<F, Fut>(mut compute: F, retry_count: u32) -> Result<Vec<u8>>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    let max_attempts = retry_count + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match compute().await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(e);
                }

                debug!(
                    "Computation failed (attempt {}/{}), retrying: {}",
                    attempts, max_attempts, e
                );

                tokio::time::sleep(backoff(attempts)).await;
            }
        }
    }
}
