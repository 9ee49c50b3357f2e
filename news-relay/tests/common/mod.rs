#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use news_relay::traits::{ContentCache, Notifier, SourceFetcher, Summarizer};
use news_relay::{
    Article, CacheEntry, DeliveryUnit, Dispatcher, FeedEntryMeta, MemoryCache, RelayError, Result,
    TriggeredDelivery, TRIGGERED_STATUS,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn article(url: &str) -> Article {
    Article {
        title: format!("Title of {}", url),
        url: url.to_string(),
        date_published: Utc::now(),
        content: "Something happened today. It was notable. More details later.".to_string(),
        image_url: Some("https://img.test/photo.jpg".to_string()),
    }
}

pub fn entry_meta(title: &str) -> FeedEntryMeta {
    FeedEntryMeta {
        title: title.to_string(),
        published: Some(Utc::now()),
        excerpt: format!("{} was announced. Details follow.", title),
        image_url: None,
    }
}

pub fn cache_entry(url: &str) -> CacheEntry {
    CacheEntry {
        processed_at: Utc::now(),
        title: "Earlier".to_string(),
        url: url.to_string(),
        summary: "Already sent.".to_string(),
    }
}

/// Listing and feed served from memory. `None` makes the fetch fail.
pub struct FakeSources {
    links: Mutex<Option<Vec<String>>>,
    entries: Mutex<Option<HashMap<String, FeedEntryMeta>>>,
    pub link_calls: AtomicU32,
    pub entry_calls: AtomicU32,
}

impl FakeSources {
    pub fn new(links: Option<Vec<&str>>, entries: Option<Vec<(&str, FeedEntryMeta)>>) -> Self {
        Self {
            links: Mutex::new(links.map(|links| links.into_iter().map(str::to_string).collect())),
            entries: Mutex::new(entries.map(|entries| {
                entries
                    .into_iter()
                    .map(|(url, meta)| (url.to_string(), meta))
                    .collect()
            })),
            link_calls: AtomicU32::new(0),
            entry_calls: AtomicU32::new(0),
        }
    }

    pub fn link_calls(&self) -> u32 {
        self.link_calls.load(Ordering::SeqCst)
    }

    pub fn entry_calls(&self) -> u32 {
        self.entry_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for FakeSources {
    async fn fetch_links(&self, listing_url: &str) -> Result<Vec<String>> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        self.links
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RelayError::General(format!("listing {} unavailable", listing_url)))
    }

    async fn fetch_entries(&self, feed_url: &str) -> Result<HashMap<String, FeedEntryMeta>> {
        self.entry_calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RelayError::General(format!("feed {} unavailable", feed_url)))
    }
}

pub enum SummaryBehavior {
    Reply(String),
    Nothing,
    Fail,
}

pub struct FakeSummarizer {
    behavior: SummaryBehavior,
    delay: Duration,
    calls: AtomicU32,
}

impl FakeSummarizer {
    pub fn replying(summary: &str) -> Self {
        Self::new(SummaryBehavior::Reply(summary.to_string()))
    }

    pub fn new(behavior: SummaryBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    fn name(&self) -> String {
        "fake".to_string()
    }

    async fn summarize(&self, _text: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            SummaryBehavior::Reply(summary) => Ok(Some(summary.clone())),
            SummaryBehavior::Nothing => Ok(None),
            SummaryBehavior::Fail => Err(RelayError::General("model unavailable".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendAttempt {
    pub message: String,
    pub image_url: String,
    pub link: String,
    pub delivered: bool,
}

/// Records every send attempt. Fails for the listed images, or for all.
#[derive(Default)]
pub struct RecordingNotifier {
    failing_images: HashSet<String>,
    fail_all: bool,
    attempts: Mutex<Vec<SendAttempt>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(images: &[&str]) -> Self {
        Self {
            failing_images: images.iter().map(|image| image.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> Vec<SendAttempt> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<SendAttempt> {
        self.attempts().into_iter().filter(|attempt| attempt.delivered).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> String {
        "recording".to_string()
    }

    async fn send(&self, message: &str, image_url: &str, link: &str) -> Result<()> {
        let delivered = !self.fail_all && !self.failing_images.contains(image_url);
        self.attempts.lock().unwrap().push(SendAttempt {
            message: message.to_string(),
            image_url: image_url.to_string(),
            link: link.to_string(),
            delivered,
        });

        if delivered {
            Ok(())
        } else {
            Err(RelayError::General(format!("could not fetch image {}", image_url)))
        }
    }
}

/// Memory cache that counts calls and can be told to reject writes.
pub struct CountingCache {
    inner: MemoryCache,
    pub bulk_sizes: Mutex<Vec<usize>>,
    pub gets: AtomicU32,
    pub puts: AtomicU32,
    fail_puts: AtomicBool,
}

impl CountingCache {
    pub fn new() -> Self {
        Self {
            inner: MemoryCache::new(),
            bulk_sizes: Mutex::new(Vec::new()),
            gets: AtomicU32::new(0),
            puts: AtomicU32::new(0),
            fail_puts: AtomicBool::new(false),
        }
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.bulk_sizes.lock().unwrap().clone()
    }

    pub fn puts(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, url: &str) {
        self.inner
            .put(
                &news_relay::article_cache_key(url),
                &cache_entry(url),
                Duration::from_secs(24 * 60 * 60),
            )
            .await
            .unwrap();
    }
}

#[async_trait]
impl ContentCache for CountingCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn get_bulk(&self, keys: &[String]) -> Result<HashMap<String, Option<CacheEntry>>> {
        self.bulk_sizes.lock().unwrap().push(keys.len());
        self.inner.get_bulk(keys).await
    }

    async fn put(&self, key: &str, value: &CacheEntry, ttl: Duration) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RelayError::General("store unavailable".to_string()));
        }
        self.inner.put(key, value, ttl).await
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.inner.purge_expired().await
    }
}

/// Captures batches instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    batches: Mutex<Vec<Vec<DeliveryUnit>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<DeliveryUnit>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn dispatched_urls(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flatten()
            .map(|unit| unit.article.url)
            .collect()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn create_batch(&self, units: Vec<DeliveryUnit>) -> Result<Vec<TriggeredDelivery>> {
        let triggered = units
            .iter()
            .enumerate()
            .map(|(idx, unit)| TriggeredDelivery {
                url: unit.article.url.clone(),
                instance_id: format!("delivery-{}", idx),
                status: TRIGGERED_STATUS.to_string(),
            })
            .collect();
        self.batches.lock().unwrap().push(units);
        Ok(triggered)
    }
}
