//! Cache backends.
//!
//! A backend is a plain byte store with optional TTL. Tags, envelopes and
//! single-flight live one level up in [`crate::expander::CacheExpander`], so
//! a backend only has to get, set and delete.

use crate::config::CacheBackendConfig;
use crate::error::Result;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(feature = "memcached")]
pub mod memcached;

#[cfg(feature = "memcached")]
pub use memcached::{MemcachedBackend, MemcachedConfig};

/// Byte-oriented key/value store used by the cache layer.
///
/// Implementations must be cheap to share between requests; the in-memory
/// backend clones an `Arc`, the memcached backend clones a pool handle.
pub trait CacheBackend: Send + Sync {
    /// Fetch raw bytes for `key`, `None` on miss or expiry.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store raw bytes under `key`. `ttl = None` means no expiry.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Fetch several keys, preserving input order.
    fn mget(&self, keys: &[&str]) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>>> + Send {
        async move {
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                values.push(self.get(key).await?);
            }
            Ok(values)
        }
    }

    /// Report whether the backend is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}

#[derive(Clone, Debug)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process backend on top of a concurrent hash map.
///
/// Expired entries are dropped lazily on read.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    /// Create an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries, tag stamps included.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let value = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.bytes.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.entries.remove_if(key, |_, stored| stored.is_expired(now));
            debug!("InMemory GET {} -> EXPIRED", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(
            key.to_string(),
            StoredValue {
                bytes: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Backend selected at startup from `cache.kind`.
#[derive(Clone)]
pub enum ConfiguredBackend {
    InMemory(InMemoryBackend),
    #[cfg(feature = "memcached")]
    Memcached(MemcachedBackend),
}

impl ConfiguredBackend {
    /// Build the backend described by configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` when memcached is requested but the crate
    /// was built without the `memcached` feature, or the pool cannot be built.
    pub async fn from_config(config: &CacheBackendConfig) -> Result<Self> {
        match config {
            CacheBackendConfig::Memory => {
                info!("✓ In-memory cache backend initialized");
                Ok(ConfiguredBackend::InMemory(InMemoryBackend::new()))
            }
            #[cfg(feature = "memcached")]
            CacheBackendConfig::Memcached {
                servers,
                pool_size,
                connection_timeout_secs,
            } => {
                let backend = MemcachedBackend::new(MemcachedConfig {
                    servers: servers.clone(),
                    pool_size: *pool_size,
                    connection_timeout: Duration::from_secs(*connection_timeout_secs),
                })
                .await?;
                Ok(ConfiguredBackend::Memcached(backend))
            }
            #[cfg(not(feature = "memcached"))]
            CacheBackendConfig::Memcached { .. } => Err(crate::error::Error::ConfigError(
                "memcached cache backend requires the `memcached` feature".to_string(),
            )),
        }
    }
}

impl CacheBackend for ConfiguredBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self {
            ConfiguredBackend::InMemory(backend) => backend.get(key).await,
            #[cfg(feature = "memcached")]
            ConfiguredBackend::Memcached(backend) => backend.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        match self {
            ConfiguredBackend::InMemory(backend) => backend.set(key, value, ttl).await,
            #[cfg(feature = "memcached")]
            ConfiguredBackend::Memcached(backend) => backend.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            ConfiguredBackend::InMemory(backend) => backend.delete(key).await,
            #[cfg(feature = "memcached")]
            ConfiguredBackend::Memcached(backend) => backend.delete(key).await,
        }
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        match self {
            ConfiguredBackend::InMemory(backend) => backend.mget(keys).await,
            #[cfg(feature = "memcached")]
            ConfiguredBackend::Memcached(backend) => backend.mget(keys).await,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self {
            ConfiguredBackend::InMemory(backend) => backend.health_check().await,
            #[cfg(feature = "memcached")]
            ConfiguredBackend::Memcached(backend) => backend.health_check().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = InMemoryBackend::new();

        backend
            .set("key", b"value".to_vec(), None)
            .await
            .expect("Failed to set");
        assert_eq!(
            backend.get("key").await.expect("Failed to get"),
            Some(b"value".to_vec())
        );

        backend.delete("key").await.expect("Failed to delete");
        assert_eq!(backend.get("key").await.expect("Failed to get"), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let backend = InMemoryBackend::new();
        backend
            .set("short", b"x".to_vec(), Some(Duration::from_secs(10)))
            .await
            .expect("Failed to set");
        backend
            .set("forever", b"y".to_vec(), None)
            .await
            .expect("Failed to set");

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(backend.get("short").await.expect("Failed to get"), None);
        assert!(backend.get("forever").await.expect("Failed to get").is_some());
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let backend = InMemoryBackend::new();
        backend
            .set("a", b"1".to_vec(), None)
            .await
            .expect("Failed to set");
        backend
            .set("c", b"3".to_vec(), None)
            .await
            .expect("Failed to set");

        let values = backend.mget(&["a", "b", "c"]).await.expect("Failed to mget");
        assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);
    }

    #[tokio::test]
    async fn test_configured_memory_backend() {
        let backend = ConfiguredBackend::from_config(&CacheBackendConfig::Memory)
            .await
            .expect("Failed to build backend");
        backend
            .set("k", b"v".to_vec(), None)
            .await
            .expect("Failed to set");
        assert!(backend.health_check().await.expect("Health check failed"));
        assert_eq!(
            backend.get("k").await.expect("Failed to get"),
            Some(b"v".to_vec())
        );
    }
}
