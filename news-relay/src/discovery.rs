//! Discovery: find new articles and fan out one delivery per article.
//!
//! The listing page gives the candidate order, the feed gives the content.
//! A candidate without a feed entry is dropped. Candidates already marked as
//! delivered in the cache are not dispatched.

use crate::cache::article_cache_key;
use crate::config::{CACHE_BULK_LIMIT, DEFAULT_FEED_URL, DEFAULT_LISTING_URL};
use crate::dispatch::Dispatcher;
use crate::executor::StepContext;
use crate::retry::StepPolicies;
use crate::traits::{ContentCache, SourceFetcher};
use crate::types::{
    Article, DeliveryUnit, DiscoveryParams, DiscoveryResult, FeedEntryMeta, Result,
    TriggeredDelivery,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STEP_LINKS: &str = "fetch candidate links";
const STEP_FEED: &str = "fetch feed entries";
const STEP_CHECK: &str = "check delivered state";
const STEP_TRIGGER: &str = "trigger deliveries";

#[derive(Clone)]
pub struct DiscoveryDeps {
    pub sources: Arc<dyn SourceFetcher>,
    pub cache: Arc<dyn ContentCache>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub policies: StepPolicies,
    /// Keys per bulk cache read.
    pub bulk_limit: usize,
    pub default_listing_url: String,
    pub default_feed_url: String,
}

impl DiscoveryDeps {
    pub fn new(
        sources: Arc<dyn SourceFetcher>,
        cache: Arc<dyn ContentCache>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            sources,
            cache,
            dispatcher,
            policies: StepPolicies::default(),
            bulk_limit: CACHE_BULK_LIMIT,
            default_listing_url: DEFAULT_LISTING_URL.to_string(),
            default_feed_url: DEFAULT_FEED_URL.to_string(),
        }
    }
}

pub async fn run_discovery(
    params: DiscoveryParams,
    ctx: &StepContext,
    deps: &DiscoveryDeps,
) -> Result<DiscoveryResult> {
    let listing_url = params.listing_url.unwrap_or_else(|| deps.default_listing_url.clone());
    let feed_url = params.feed_url.unwrap_or_else(|| deps.default_feed_url.clone());

    info!(run_id = ctx.run_id(), listing = %listing_url, feed = %feed_url, "Starting discovery");

    let sources = &deps.sources;
    let listing = listing_url.as_str();
    let links: Option<Vec<String>> = match ctx
        .step(STEP_LINKS, &deps.policies.fetch, move || async move {
            sources.fetch_links(listing).await
        })
        .await
    {
        Ok(links) if links.is_empty() => {
            info!(listing = %listing_url, "Listing has no candidate links");
            return Ok(DiscoveryResult::empty("No candidate links found"));
        }
        Ok(links) => Some(links),
        Err(e) => {
            warn!(listing = %listing_url, error = %e, "Listing fetch failed, continuing with feed entries only");
            None
        }
    };

    let feed = feed_url.as_str();
    let entries: HashMap<String, FeedEntryMeta> = match ctx
        .step(STEP_FEED, &deps.policies.fetch, move || async move {
            sources.fetch_entries(feed).await
        })
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            warn!(feed = %feed_url, error = %e, "Feed fetch failed, continuing without feed entries");
            HashMap::new()
        }
    };

    let candidates = match links {
        Some(links) => dedup(links),
        None => newest_first(&entries),
    };
    if candidates.is_empty() {
        return Ok(DiscoveryResult::empty("No candidate links found"));
    }

    let cache = &deps.cache;
    let bulk_limit = deps.bulk_limit.clamp(1, CACHE_BULK_LIMIT);
    let candidate_urls = &candidates;
    let delivered: HashMap<String, bool> = ctx
        .step(STEP_CHECK, &deps.policies.local, move || async move {
            check_delivered(&**cache, candidate_urls, bulk_limit).await
        })
        .await?;

    let mut units = Vec::new();
    for url in &candidates {
        if delivered.get(url).copied().unwrap_or(false) {
            debug!(url = %url, "Already delivered");
            continue;
        }

        let Some(meta) = entries.get(url) else {
            info!(url = %url, "Candidate not in feed, skipping");
            continue;
        };

        units.push(DeliveryUnit::new(Article {
            title: meta.title.clone(),
            url: url.clone(),
            date_published: meta.published.unwrap_or_else(Utc::now),
            content: if meta.excerpt.trim().is_empty() {
                meta.title.clone()
            } else {
                meta.excerpt.clone()
            },
            image_url: meta.image_url.clone(),
        }));
    }

    let new_articles = units.len();
    let triggered: Vec<TriggeredDelivery> = if units.is_empty() {
        Vec::new()
    } else {
        let dispatcher = &deps.dispatcher;
        let batch = &units;
        ctx.step(STEP_TRIGGER, &deps.policies.local, move || async move {
            dispatcher.create_batch(batch.clone()).await
        })
        .await?
    };

    let message = format!(
        "Found {} candidate links, {} new articles, triggered {} deliveries",
        candidates.len(),
        new_articles,
        triggered.len()
    );
    info!(run_id = ctx.run_id(), "{}", message);

    Ok(DiscoveryResult {
        success: true,
        message,
        links_found: candidates.len(),
        new_articles,
        triggered,
    })
}

/// URL → delivered, reading at most `bulk_limit` keys per cache call.
async fn check_delivered(
    cache: &dyn ContentCache,
    urls: &[String],
    bulk_limit: usize,
) -> Result<HashMap<String, bool>> {
    let mut delivered = HashMap::with_capacity(urls.len());

    for chunk in urls.chunks(bulk_limit) {
        let keys: Vec<String> = chunk.iter().map(|url| article_cache_key(url)).collect();
        let found = cache.get_bulk(&keys).await?;

        for (url, key) in chunk.iter().zip(&keys) {
            let hit = found.get(key).map_or(false, Option::is_some);
            delivered.insert(url.clone(), hit);
        }
    }

    Ok(delivered)
}

fn dedup(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links.into_iter().filter(|link| seen.insert(link.clone())).collect()
}

/// Feed URLs ordered by publish date, newest first. Undated entries go last.
fn newest_first(entries: &HashMap<String, FeedEntryMeta>) -> Vec<String> {
    let mut urls: Vec<(&String, &FeedEntryMeta)> = entries.iter().collect();
    urls.sort_by(|(a_url, a), (b_url, b)| b.published.cmp(&a.published).then_with(|| a_url.cmp(b_url)));
    urls.into_iter().map(|(url, _)| url.clone()).collect()
}
