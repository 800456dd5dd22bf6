//! Cache expander - tag-aware get-or-compute over a [`CacheBackend`].
//!
//! Every cached entry records the stamp each of its tags had *before* the
//! payload was computed. Invalidating a tag writes a fresh random stamp, so
//! any entry computed under the old stamp reads as a miss from then on. A
//! listing computed concurrently with a write therefore cannot survive the
//! write's invalidation, whichever finishes first.

use crate::backend::CacheBackend;
use crate::builder::CacheOperationBuilder;
use crate::error::Result;
use crate::key::CacheKeyBuilder;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::serialization::{self, CachedItem, TagStamp};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Core cache expander.
///
/// # Example
///
/// ```ignore
/// use bookshelf_api::{CacheExpander, backend::InMemoryBackend};
///
/// let expander = CacheExpander::new(InMemoryBackend::new());
/// let bytes = expander
///     .builder("getAllBooks-1-3")
///     .with_tag("booksCache")
///     .execute(|| async { render_books().await })
///     .await?;
/// ```
pub struct CacheExpander<B: CacheBackend> {
    backend: B,
    metrics: Arc<dyn CacheMetrics>,
    pub(crate) ttl_policy: TtlPolicy,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl<B: CacheBackend> CacheExpander<B> {
    /// Create a new expander over `backend`, with no-op metrics and no TTL.
    pub fn new(backend: B) -> Self {
        CacheExpander {
            backend,
            metrics: Arc::new(NoOpMetrics),
            ttl_policy: TtlPolicy::default(),
            in_flight: DashMap::new(),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the TTL applied when an operation does not override it.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// Start configuring a cached computation for `key`.
    pub fn builder(&self, key: impl Into<String>) -> CacheOperationBuilder<'_, B> {
        CacheOperationBuilder::new(self, key.into())
    }

    /// Return the payload cached under `key`, or await `compute` and cache it.
    ///
    /// `compute` is only polled on a miss. Concurrent misses on the same key
    /// are serialized so the computation runs once and the others read its
    /// result.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError`: `key` is not storable
    /// - `Error::BackendError` / `Error::Timeout`: the backend failed on read
    /// - whatever `compute` returns
    ///
    /// Backend failures while *writing* the computed payload are logged and
    /// the payload is still returned.
    pub async fn get_or_compute<Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<Duration>,
        compute: Fut,
    ) -> Result<Vec<u8>>
    where
        Fut: Future<Output = Result<Vec<u8>>> + Send,
    {
        CacheKeyBuilder::validate(key)?;
        let timer = Instant::now();

        if let Some(payload) = self.lookup(key, tags).await? {
            self.metrics.record_hit(key, timer.elapsed());
            debug!("✓ Cache hit for {}", key);
            return Ok(payload);
        }

        let lock = Arc::clone(&self.in_flight.entry(key.to_string()).or_default());
        let result = {
            let _guard = lock.lock().await;
            self.compute_locked(key, tags, ttl, compute, timer).await
        };

        drop(lock);
        self.in_flight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn compute_locked<Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<Duration>,
        compute: Fut,
        timer: Instant,
    ) -> Result<Vec<u8>>
    where
        Fut: Future<Output = Result<Vec<u8>>> + Send,
    {
        // Another request may have filled the entry while we waited.
        if let Some(payload) = self.lookup(key, tags).await? {
            self.metrics.record_hit(key, timer.elapsed());
            debug!("✓ Cache filled by concurrent request for {}", key);
            return Ok(payload);
        }

        let stamps = self.current_stamps(tags).await?;

        let payload = match compute.await {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics.record_error(key, &e.to_string());
                return Err(e);
            }
        };

        match stamps {
            Some(stamps) => self.store(key, stamps, &payload, ttl).await,
            None => warn!("Not caching {}: tag stamps could not be written", key),
        }

        self.metrics.record_miss(key, timer.elapsed());
        debug!("✗ Cache miss for {}, computed in {:?}", key, timer.elapsed());
        Ok(payload)
    }

    /// Read `key` and check its tag stamps. Unreadable or stale entries are `None`.
    async fn lookup(&self, key: &str, tags: &[String]) -> Result<Option<Vec<u8>>> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.metrics.record_error(key, &e.to_string());
                return Err(e);
            }
        };

        let item = match serialization::deserialize_from_cache(&bytes) {
            Ok(item) => item,
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                if let Err(e) = self.backend.delete(key).await {
                    warn!("Failed to delete {}: {}", key, e);
                }
                return Ok(None);
            }
        };

        if !self.stamps_match(&item.tags, tags).await? {
            debug!("Cache entry {} is stale", key);
            return Ok(None);
        }
        Ok(Some(item.payload))
    }

    async fn stamps_match(&self, recorded: &[TagStamp], tags: &[String]) -> Result<bool> {
        if tags
            .iter()
            .any(|tag| !recorded.iter().any(|stamp| &stamp.tag == tag))
        {
            return Ok(false);
        }

        let keys: Vec<String> = recorded
            .iter()
            .map(|stamp| CacheKeyBuilder::tag(&stamp.tag))
            .collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let current = self.backend.mget(&key_refs).await?;

        Ok(recorded.iter().zip(current).all(|(stamp, value)| {
            value.as_deref().and_then(serialization::decode_stamp) == Some(stamp.stamp)
        }))
    }

    /// Current stamp of every tag, creating stamps for tags never seen.
    ///
    /// `None` when a missing stamp could not be written; the payload must not
    /// be cached then, since its stamp would never match.
    async fn current_stamps(&self, tags: &[String]) -> Result<Option<Vec<TagStamp>>> {
        let keys: Vec<String> = tags.iter().map(|tag| CacheKeyBuilder::tag(tag)).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let current = self.backend.mget(&key_refs).await?;

        let mut stamps = Vec::with_capacity(tags.len());
        for ((tag, key), value) in tags.iter().zip(&keys).zip(current) {
            let stamp = match value.as_deref().and_then(serialization::decode_stamp) {
                Some(stamp) => stamp,
                None => {
                    let stamp = rand::random::<u64>();
                    if let Err(e) = self
                        .backend
                        .set(key, serialization::encode_stamp(stamp), None)
                        .await
                    {
                        self.metrics.record_error(key, &e.to_string());
                        return Ok(None);
                    }
                    stamp
                }
            };
            stamps.push(TagStamp {
                tag: tag.clone(),
                stamp,
            });
        }
        Ok(Some(stamps))
    }

    async fn store(&self, key: &str, tags: Vec<TagStamp>, payload: &[u8], ttl: Option<Duration>) {
        let item = CachedItem {
            tags,
            payload: payload.to_vec(),
        };
        let bytes = match serialization::serialize_for_cache(&item) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.record_error(key, &e.to_string());
                return;
            }
        };
        if let Err(e) = self.backend.set(key, bytes, ttl).await {
            self.metrics.record_error(key, &e.to_string());
            warn!("Failed to cache {}: {}", key, e);
        }
    }

    /// Invalidate every entry carrying any of `tags`.
    ///
    /// # Errors
    ///
    /// Returns the backend error if a new stamp cannot be written; entries
    /// under that tag may still be served in that case.
    pub async fn invalidate_tags(&self, tags: &[&str]) -> Result<()> {
        for tag in tags {
            let stamp = rand::random::<u64>();
            self.backend
                .set(
                    &CacheKeyBuilder::tag(tag),
                    serialization::encode_stamp(stamp),
                    None,
                )
                .await?;
            self.metrics.record_invalidation(tag);
            debug!("Invalidated cache tag {}", tag);
        }
        Ok(())
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
