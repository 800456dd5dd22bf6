//! Memcached cache backend.
//!
//! Memcached has no tag support of its own; tag stamps are ordinary keys
//! written by the expander, so invalidation works across every process that
//! shares the same servers.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Pool};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Configuration for the memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>,
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: 16,
        }
    }
}

/// Pooled memcached client.
#[derive(Clone)]
pub struct MemcachedBackend {
    pool: Pool,
    connection_timeout: Duration,
}

impl MemcachedBackend {
    /// Build the connection pool. Only the first server is used.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if no server is given or the pool cannot be built.
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        let pool = Pool::builder(Manager::new(addr.clone()))
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached backend initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedBackend {
            pool,
            connection_timeout: config.connection_timeout,
        })
    }
}

/// Bound a pool checkout by the configured connection timeout.
async fn timed<F: Future>(limit: Duration, fut: F) -> Result<F::Output> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(limit))
}

fn checkout_error(e: impl std::fmt::Display) -> Error {
    Error::BackendError(format!("Failed to get Memcached connection: {}", e))
}

impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = timed(self.connection_timeout, self.pool.get())
            .await?
            .map_err(checkout_error)?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("Memcached GET {} -> HIT", key);
                Ok(value.data)
            }
            Ok(None) => {
                debug!("Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = timed(self.connection_timeout, self.pool.get())
            .await?
            .map_err(checkout_error)?;

        // memcached reads values below 30 days as relative seconds
        let expiration = ttl.map(|d| d.as_secs() as i64);

        conn.set(key, value.as_slice(), expiration, None)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        debug!("Memcached SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = timed(self.connection_timeout, self.pool.get())
            .await?
            .map_err(checkout_error)?;

        conn.delete(key).await.map_err(|e| {
            Error::BackendError(format!("Memcached DELETE failed for key {}: {}", key, e))
        })?;

        debug!("Memcached DELETE {}", key);
        Ok(())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = timed(self.connection_timeout, self.pool.get())
            .await?
            .map_err(checkout_error)?;

        // get_multi reports "not found" when none of the keys exist
        let values = match conn.get_multi(keys).await {
            Ok(values) => values,
            Err(e) if e.to_string().contains("not found") => return Ok(vec![None; keys.len()]),
            Err(e) => return Err(Error::BackendError(format!("Memcached MGET failed: {}", e))),
        };

        let mut by_key: HashMap<String, Vec<u8>> = HashMap::with_capacity(values.len());
        for value in values {
            if let Some(data) = value.data {
                by_key.insert(String::from_utf8_lossy(&value.key).into_owned(), data);
            }
        }

        Ok(keys.iter().map(|key| by_key.remove(*key)).collect())
    }

    async fn health_check(&self) -> Result<bool> {
        match timed(self.connection_timeout, self.pool.get()).await {
            Ok(Ok(mut conn)) => Ok(conn.get("__health_check__").await.is_ok()),
            _ => Ok(false),
        }
    }
}
