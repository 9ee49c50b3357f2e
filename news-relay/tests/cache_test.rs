mod common;

use common::*;
use news_relay::traits::ContentCache;
use news_relay::{article_cache_key, MemoryCache, RelayError};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[test]
fn key_is_prefixed_url() {
    assert_eq!(article_cache_key("https://x/a"), "article:https://x/a");
}

#[tokio::test(start_paused = true)]
async fn entry_lives_until_ttl() {
    init_tracing();
    let cache = MemoryCache::new();
    let key = article_cache_key("https://x/a");
    let entry = cache_entry("https://x/a");

    assert_ok!(cache.put(&key, &entry, DAY).await);
    assert_eq!(assert_ok!(cache.get(&key).await), Some(entry));

    tokio::time::advance(DAY - Duration::from_secs(1)).await;
    assert!(assert_ok!(cache.get(&key).await).is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(assert_ok!(cache.get(&key).await).is_none());
    assert!(cache.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn bulk_read_reports_every_key() {
    let cache = MemoryCache::new();
    let hit = article_cache_key("https://x/a");
    let miss = article_cache_key("https://x/b");
    cache.put(&hit, &cache_entry("https://x/a"), DAY).await.unwrap();

    let found = assert_ok!(cache.get_bulk(&[hit.clone(), miss.clone()]).await);

    assert_eq!(found.len(), 2);
    assert!(found[&hit].is_some());
    assert!(found[&miss].is_none());
}

#[tokio::test]
async fn bulk_read_over_limit_is_rejected() {
    let cache = MemoryCache::with_bulk_limit(2);
    let keys: Vec<String> = (0..3).map(|i| article_cache_key(&format!("https://x/{}", i))).collect();

    let err = assert_err!(cache.get_bulk(&keys).await);
    assert!(matches!(err, RelayError::BulkLimitExceeded { requested: 3, limit: 2 }));
}

#[tokio::test(start_paused = true)]
async fn rewrite_replaces_value_and_ttl() {
    let cache = MemoryCache::new();
    let key = article_cache_key("https://x/a");
    let mut entry = cache_entry("https://x/a");

    cache.put(&key, &entry, Duration::from_secs(60)).await.unwrap();
    entry.summary = "Second".to_string();
    cache.put(&key, &entry, DAY).await.unwrap();

    tokio::time::advance(Duration::from_secs(120)).await;
    let current = assert_ok!(cache.get(&key).await).unwrap();
    assert_eq!(current.summary, "Second");
    assert_eq!(cache.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn purge_drops_only_expired_entries() {
    let cache = MemoryCache::new();
    cache.put(&article_cache_key("https://x/a"), &cache_entry("https://x/a"), Duration::from_secs(60)).await.unwrap();
    cache.put(&article_cache_key("https://x/b"), &cache_entry("https://x/b"), DAY).await.unwrap();

    assert_eq!(assert_ok!(cache.purge_expired().await), 0);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(assert_ok!(cache.purge_expired().await), 1);
    assert_eq!(cache.len().await, 1);
    assert!(assert_ok!(cache.get(&article_cache_key("https://x/b")).await).is_some());
}
