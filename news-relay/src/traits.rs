use crate::types::{CacheEntry, FeedEntryMeta, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Durable key-value store for delivery markers. Entries expire on their own;
/// there is no delete.
#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Reads up to the store's bulk limit of keys in one call. Every requested
    /// key is present in the returned map.
    async fn get_bulk(&self, keys: &[String]) -> Result<HashMap<String, Option<CacheEntry>>>;

    async fn put(&self, key: &str, value: &CacheEntry, ttl: Duration) -> Result<()>;

    /// Removes entries past their expiry. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Turns the two discovery sources into candidate links and feed metadata.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Article links found on the listing page, in page order.
    async fn fetch_links(&self, listing_url: &str) -> Result<Vec<String>>;

    /// Feed entries keyed by article URL.
    async fn fetch_entries(&self, feed_url: &str) -> Result<HashMap<String, FeedEntryMeta>>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> String;

    /// `Ok(None)` means the model answered but produced nothing usable.
    async fn summarize(&self, text: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> String;

    /// Delivers `message` with an image and a call-to-action link.
    async fn send(&self, message: &str, image_url: &str, link: &str) -> Result<()>;
}
