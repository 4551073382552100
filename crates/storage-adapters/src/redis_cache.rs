//! Redis-backed page cache invalidation.

use async_trait::async_trait;
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use tracing::debug;

use domains::{CacheStore, DomainError, Result};

pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn connect(url: &str, max_connections: usize) -> Result<Self> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(max_connections));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(DomainError::internal)?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    /// One `DEL` for all keys. Redis ignores keys that do not exist.
    async fn delete(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await.map_err(DomainError::internal)?;
        let removed: i64 = cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(DomainError::internal)?;
        debug!(requested = keys.len(), removed, "cache keys deleted");
        Ok(())
    }
}
