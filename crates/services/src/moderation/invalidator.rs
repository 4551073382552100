use std::sync::Arc;

use tracing::debug;

use domains::{CacheStore, DomainError, Result};

use super::cache_keys::CacheKeySet;

/// Submits derived keys to the cache as one blind delete.
pub struct CacheInvalidator {
    cache: Arc<dyn CacheStore>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self { cache }
    }

    /// Returns the keys submitted. An empty set makes no cache call. Any
    /// failure is `Internal`, whatever the cache reported.
    pub async fn invalidate(&self, keys: &CacheKeySet) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = keys.to_strings();
        self.cache.delete(&keys).await.map_err(|e| match e {
            DomainError::Internal(_) => e,
            other => DomainError::internal(format!("cache delete: {other}")),
        })?;
        debug!(count = keys.len(), "cache keys invalidated");
        Ok(keys)
    }
}
