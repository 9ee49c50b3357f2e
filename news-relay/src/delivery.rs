//! Delivery of one article: idempotency check, summary, message, send, record.
//!
//! The cache entry is written only after a confirmed send. A crash between the
//! two leaves no marker, so a new run for the same URL sends again. A retry of
//! the same run does not, because the send step is replayed from the journal.

use crate::cache::article_cache_key;
use crate::config::{DELIVERY_TTL, FALLBACK_IMAGE_URL};
use crate::executor::StepContext;
use crate::message::compose_message;
use crate::retry::StepPolicies;
use crate::traits::{ContentCache, Notifier, Summarizer};
use crate::types::{CacheEntry, DeliveryResult, DeliveryUnit, RelayError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const STEP_CHECK: &str = "check delivered";
const STEP_SUMMARIZE: &str = "summarize";
const STEP_COMPOSE: &str = "compose message";
const STEP_SEND: &str = "send notification";
const STEP_RECORD: &str = "record delivery";

/// Collaborators of a delivery run.
#[derive(Clone)]
pub struct DeliveryDeps {
    pub cache: Arc<dyn ContentCache>,
    pub summarizer: Arc<dyn Summarizer>,
    pub notifier: Arc<dyn Notifier>,
    pub policies: StepPolicies,
    pub ttl: Duration,
    pub fallback_image_url: String,
}

impl DeliveryDeps {
    pub fn new(
        cache: Arc<dyn ContentCache>,
        summarizer: Arc<dyn Summarizer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            cache,
            summarizer,
            notifier,
            policies: StepPolicies::default(),
            ttl: DELIVERY_TTL,
            fallback_image_url: FALLBACK_IMAGE_URL.to_string(),
        }
    }
}

pub async fn run_delivery(
    unit: DeliveryUnit,
    ctx: &StepContext,
    deps: &DeliveryDeps,
) -> Result<DeliveryResult> {
    let article = &unit.article;
    let url = article.url.as_str();
    let key = article_cache_key(url);

    if !unit.reprocess {
        let cache = &deps.cache;
        let key = key.as_str();
        let existing: Option<CacheEntry> = ctx
            .step(STEP_CHECK, &deps.policies.local, move || async move { cache.get(key).await })
            .await?;

        if existing.is_some() {
            info!(url, run_id = ctx.run_id(), "Skipping article, already delivered");
            return Ok(DeliveryResult::skipped(url));
        }
    }

    let summarizer = &deps.summarizer;
    let content = article.content.as_str();
    let summary: String = ctx
        .step(STEP_SUMMARIZE, &deps.policies.summarize, move || async move {
            match summarizer.summarize(content).await? {
                Some(summary) if !summary.trim().is_empty() => Ok(summary.trim().to_string()),
                _ => Err(RelayError::EmptySummary),
            }
        })
        .await
        .map_err(|e| {
            error!(url, error = %e, "Summarization failed");
            RelayError::SummaryFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

    let title = article.title.as_str();
    let summary_text = summary.as_str();
    let message: String = ctx
        .step(STEP_COMPOSE, &deps.policies.local, move || async move {
            Ok(compose_message(title, summary_text))
        })
        .await?;

    let notifier = &deps.notifier;
    let image_url = article
        .image_url
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .unwrap_or(&deps.fallback_image_url);
    let message_text = message.as_str();
    let delivered_at: DateTime<Utc> = ctx
        .step(STEP_SEND, &deps.policies.send, move || async move {
            notifier.send(message_text, image_url, url).await?;
            Ok(Utc::now())
        })
        .await
        .map_err(|e| {
            error!(url, error = %e, "Notification failed");
            RelayError::NotificationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

    let entry = CacheEntry {
        processed_at: delivered_at,
        title: article.title.clone(),
        url: url.to_string(),
        summary: summary.clone(),
    };
    let cache = &deps.cache;
    let key = key.as_str();
    let entry_ref = &entry;
    let ttl = deps.ttl;
    ctx.step(STEP_RECORD, &deps.policies.record, move || async move {
        cache.put(key, entry_ref, ttl).await
    })
    .await
    .map_err(|e| {
        error!(url, error = %e, "Notification sent but delivery was not recorded");
        RelayError::RecordFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })?;

    info!(url, run_id = ctx.run_id(), "Article delivered");
    Ok(DeliveryResult::delivered(article, summary, delivered_at))
}
