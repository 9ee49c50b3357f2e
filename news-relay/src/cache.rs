use crate::config::{CACHE_BULK_LIMIT, CACHE_KEY_PREFIX};
use crate::traits::ContentCache;
use crate::types::{CacheEntry, RelayError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Cache key marking `url` as delivered.
pub fn article_cache_key(url: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, url)
}

/// In-process cache with per-entry expiry. Expired entries read as absent and
/// are dropped on the next write or purge.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (CacheEntry, Instant)>>,
    bulk_limit: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_bulk_limit(CACHE_BULK_LIMIT)
    }

    pub fn with_bulk_limit(bulk_limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            bulk_limit,
        }
    }

    /// Live entries only.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|(_, expires_at)| *expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn drop_expired(entries: &mut HashMap<String, (CacheEntry, Instant)>, now: Instant) -> u64 {
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        let dropped = (before - entries.len()) as u64;
        if dropped > 0 {
            debug!("Dropped {} expired cache entries", dropped);
        }
        dropped
    }

    fn live(entry: Option<&(CacheEntry, Instant)>, now: Instant) -> Option<CacheEntry> {
        entry
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.read().await;
        Ok(Self::live(entries.get(key), Instant::now()))
    }

    async fn get_bulk(&self, keys: &[String]) -> Result<HashMap<String, Option<CacheEntry>>> {
        if keys.len() > self.bulk_limit {
            return Err(RelayError::BulkLimitExceeded {
                requested: keys.len(),
                limit: self.bulk_limit,
            });
        }

        let now = Instant::now();
        let entries = self.entries.read().await;

        Ok(keys
            .iter()
            .map(|key| (key.clone(), Self::live(entries.get(key), now)))
            .collect())
    }

    async fn put(&self, key: &str, value: &CacheEntry, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        Self::drop_expired(&mut entries, now);
        entries.insert(key.to_string(), (value.clone(), now + ttl));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut entries = self.entries.write().await;
        Ok(Self::drop_expired(&mut entries, Instant::now()))
    }
}
