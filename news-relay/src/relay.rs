use crate::cache::MemoryCache;
use crate::config::RelayConfig;
use crate::delivery::{run_delivery, DeliveryDeps};
use crate::discovery::{run_discovery, DiscoveryDeps};
use crate::dispatch::{Dispatcher, TaskDispatcher};
use crate::executor::{MemoryJournal, StepContext, StepJournal};
use crate::notifier::{FallbackImageNotifier, LogNotifier};
use crate::sources::{ListingParser, SiteSourceFetcher};
use crate::state::RunRegistry;
use crate::summarizer::ExtractiveSummarizer;
use crate::traits::{ContentCache, Notifier, SourceFetcher, Summarizer};
use crate::types::{
    Article, DeliveryResult, DeliveryUnit, DiscoveryParams, DiscoveryResult, RelayError, Result,
    RunState, RunStatus, RunType, TriggerResponse,
};
use crate::utils::url::{is_http_url, normalize_article_url};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Entry point for callers: manual triggers, run status and the schedule.
#[derive(Clone)]
pub struct NewsRelay {
    discovery: Arc<DiscoveryDeps>,
    delivery: Arc<DeliveryDeps>,
    dispatcher: Arc<dyn Dispatcher>,
    journal: Arc<dyn StepJournal>,
    registry: Arc<RunRegistry>,
    retention: Duration,
}

impl NewsRelay {
    pub fn builder(config: RelayConfig) -> RelayBuilder {
        RelayBuilder::new(config)
    }

    /// Starts a discovery run in the background.
    pub async fn trigger_discovery(&self, params: DiscoveryParams) -> TriggerResponse {
        if let Err(e) = validate_discovery(&params) {
            warn!(error = %e, "Rejected discovery trigger");
            return TriggerResponse::failed(RunType::Discovery, e);
        }

        let run_id = Uuid::new_v4().to_string();
        self.registry.register(RunType::Discovery, &run_id).await;

        let relay = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            relay.registry.mark_running(RunType::Discovery, &id).await;
            let ctx = StepContext::new(id.clone(), relay.journal.clone());

            match run_discovery(params, &ctx, &relay.discovery).await {
                Ok(result) => relay.registry.complete(RunType::Discovery, &id, &result).await,
                Err(e) => {
                    error!(run_id = %id, error = %e, "Discovery run failed");
                    relay.registry.fail(RunType::Discovery, &id, &e).await;
                }
            }
            ctx.release().await;
        });

        info!(run_id = %run_id, "Discovery triggered");
        TriggerResponse::accepted(RunType::Discovery, run_id)
    }

    /// Starts a delivery run for one article in the background.
    pub async fn trigger_delivery(&self, article: Article, reprocess: bool) -> TriggerResponse {
        let article = match prepare_article(article) {
            Ok(article) => article,
            Err(e) => {
                warn!(error = %e, "Rejected delivery trigger");
                return TriggerResponse::failed(RunType::Delivery, e);
            }
        };

        let unit = DeliveryUnit { article, reprocess };
        match self.dispatcher.create_batch(vec![unit]).await {
            Ok(mut triggered) => match triggered.pop() {
                Some(instance) => {
                    info!(url = %instance.url, run_id = %instance.instance_id, reprocess, "Delivery triggered");
                    TriggerResponse::accepted(RunType::Delivery, instance.instance_id)
                }
                None => TriggerResponse::failed(RunType::Delivery, "dispatcher returned no instance"),
            },
            Err(e) => {
                error!(error = %e, "Failed to dispatch delivery");
                TriggerResponse::failed(RunType::Delivery, e)
            }
        }
    }

    pub async fn status(&self, run_type: RunType, run_id: &str) -> Result<RunStatus> {
        self.registry.status(run_type, run_id).await
    }

    /// Waits for a run started by this relay to finish.
    pub async fn wait(&self, run_type: RunType, run_id: &str) -> Result<RunStatus> {
        self.registry.wait(run_type, run_id).await
    }

    /// Runs discovery in the caller's task. Deliveries it triggers still run
    /// in the background.
    pub async fn discover_now(&self, params: DiscoveryParams) -> Result<DiscoveryResult> {
        validate_discovery(&params)?;
        let ctx = StepContext::new(Uuid::new_v4().to_string(), self.journal.clone());
        let result = run_discovery(params, &ctx, &self.discovery).await;
        ctx.release().await;
        result
    }

    /// Runs one delivery in the caller's task.
    pub async fn deliver_now(&self, mut unit: DeliveryUnit) -> Result<DeliveryResult> {
        unit.article = prepare_article(unit.article)?;
        let ctx = StepContext::new(Uuid::new_v4().to_string(), self.journal.clone());
        let result = run_delivery(unit, &ctx, &self.delivery).await;
        ctx.release().await;
        result
    }

    /// Waits for every delivery a discovery run triggered. Returns how many errored.
    pub async fn wait_for_deliveries(&self, result: &DiscoveryResult) -> Result<usize> {
        let mut failed = 0;
        for instance in &result.triggered {
            let status = self.wait(RunType::Delivery, &instance.instance_id).await?;
            if status.state == RunState::Errored {
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Runs tracked by this relay, ended or not.
    pub async fn tracked_runs(&self) -> usize {
        self.registry.len().await
    }

    /// Forgets runs that ended more than the retention window ago, purges
    /// journal steps abandoned for as long and drops expired cache entries.
    pub async fn maintain(&self) -> Result<()> {
        let runs = self.registry.prune(self.retention).await;
        let steps = self.journal.purge_older_than(self.retention).await?;
        let entries = self.discovery.cache.purge_expired().await?;

        debug!(runs, steps, entries, "Maintenance pass finished");
        Ok(())
    }

    /// Triggers discovery every `interval` until `shutdown` resolves. The
    /// first run starts immediately; missed ticks are skipped. Each tick
    /// starts with a [`NewsRelay::maintain`] pass.
    pub async fn run_periodic<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(?interval, "Starting scheduled discovery");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduled discovery stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.maintain().await {
                        warn!(error = %e, "Maintenance pass failed");
                    }

                    let response = self.trigger_discovery(DiscoveryParams::default()).await;
                    match response.run_id {
                        Some(run_id) => info!(run_id = %run_id, "Scheduled discovery triggered"),
                        None => error!(error = ?response.error, "Scheduled discovery was not triggered"),
                    }
                }
            }
        }
    }
}

fn validate_discovery(params: &DiscoveryParams) -> Result<()> {
    for (name, value) in [("listing_url", &params.listing_url), ("feed_url", &params.feed_url)] {
        if let Some(url) = value {
            if !is_http_url(url) {
                return Err(RelayError::InvalidTrigger(format!("{} is not an http(s) URL: {}", name, url)));
            }
        }
    }
    Ok(())
}

/// Checks a manually supplied article and rewrites its URL to the canonical
/// form discovery uses, so both paths share one cache key per article.
fn prepare_article(mut article: Article) -> Result<Article> {
    if article.title.trim().is_empty() {
        return Err(RelayError::InvalidTrigger("article title is empty".to_string()));
    }

    let normalized = normalize_article_url(article.url.trim());
    match normalized {
        Some(url) if is_http_url(&url) => {
            article.url = url;
            Ok(article)
        }
        _ => Err(RelayError::InvalidTrigger(format!(
            "article url is not an http(s) URL: {}",
            article.url
        ))),
    }
}

/// Wires a [`NewsRelay`]. Collaborators left unset get offline defaults:
/// in-memory cache and journal, the site fetcher with the configured listing
/// parser, the extractive summarizer and the log notifier.
pub struct RelayBuilder {
    config: RelayConfig,
    cache: Option<Arc<dyn ContentCache>>,
    journal: Option<Arc<dyn StepJournal>>,
    sources: Option<Arc<dyn SourceFetcher>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl RelayBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            cache: None,
            journal: None,
            sources: None,
            summarizer: None,
            notifier: None,
        }
    }

    pub fn cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn journal(mut self, journal: Arc<dyn StepJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn sources(mut self, sources: Arc<dyn SourceFetcher>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// The notifier is wrapped in the image fallback on build.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<NewsRelay> {
        let config = self.config;
        config.validate()?;

        let cache: Arc<dyn ContentCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::with_bulk_limit(config.cache_bulk_limit)),
        };
        let journal: Arc<dyn StepJournal> = match self.journal {
            Some(journal) => journal,
            None => Arc::new(MemoryJournal::new()),
        };
        let sources: Arc<dyn SourceFetcher> = match self.sources {
            Some(sources) => sources,
            None => Arc::new(
                SiteSourceFetcher::new(config.fetch.clone())?.with_listing_parser(listing_parser(&config)?),
            ),
        };
        let summarizer: Arc<dyn Summarizer> = match self.summarizer {
            Some(summarizer) => summarizer,
            None => Arc::new(ExtractiveSummarizer::new().with_sentences(config.summary_sentences)),
        };
        let notifier: Arc<dyn Notifier> = Arc::new(FallbackImageNotifier::new(
            self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            config.fallback_image_url.clone(),
        ));

        info!(
            summarizer = %summarizer.name(),
            notifier = %notifier.name(),
            "Relay configured"
        );

        let delivery = DeliveryDeps {
            cache: cache.clone(),
            summarizer,
            notifier,
            policies: config.policies.clone(),
            ttl: config.delivery_ttl,
            fallback_image_url: config.fallback_image_url.clone(),
        };

        let registry = Arc::new(RunRegistry::new());
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(TaskDispatcher::new(
            delivery.clone(),
            journal.clone(),
            registry.clone(),
        ));

        let discovery = DiscoveryDeps {
            sources,
            cache,
            dispatcher: dispatcher.clone(),
            policies: config.policies.clone(),
            bulk_limit: config.cache_bulk_limit,
            default_listing_url: config.listing_url.clone(),
            default_feed_url: config.feed_url.clone(),
        };

        Ok(NewsRelay {
            discovery: Arc::new(discovery),
            delivery: Arc::new(delivery),
            dispatcher,
            journal,
            registry,
            retention: config.run_retention,
        })
    }
}

fn listing_parser(config: &RelayConfig) -> Result<ListingParser> {
    let mut parser = ListingParser::new();
    if let Some(css) = config.listing_selector.as_deref() {
        parser = parser.with_selector(css)?;
    }
    if let Some(prefix) = config.listing_path_prefix.as_deref() {
        parser = parser.with_path_prefix(prefix);
    }
    Ok(parser)
}
