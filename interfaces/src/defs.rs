use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status marker attached to every delivery spawned by a discovery run.
pub const TRIGGERED_STATUS: &str = "triggered";

/// Reason reported when a delivery finds a live cache entry for its URL.
pub const ALREADY_PROCESSED_REASON: &str = "Article already processed";

/// A single article ready for delivery. The URL is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub date_published: DateTime<Utc>,
    /// Text handed to the summarizer.
    pub content: String,
    pub image_url: Option<String>,
}

/// Metadata the feed carries for one entry, keyed by entry URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntryMeta {
    pub title: String,
    pub published: Option<DateTime<Utc>>,
    pub excerpt: String,
    pub image_url: Option<String>,
}

/// Value stored under `article:<url>` once a notification went out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub processed_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub summary: String,
}

/// Parameter object for one delivery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryUnit {
    pub article: Article,
    /// Bypass the already-delivered check.
    #[serde(default)]
    pub reprocess: bool,
}

impl DeliveryUnit {
    pub fn new(article: Article) -> Self {
        Self { article, reprocess: false }
    }

    pub fn reprocess(article: Article) -> Self {
        Self { article, reprocess: true }
    }
}

/// Source overrides for a discovery run. `None` falls back to the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryParams {
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub feed_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredDelivery {
    pub url: String,
    pub instance_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub success: bool,
    pub message: String,
    pub links_found: usize,
    pub new_articles: usize,
    pub triggered: Vec<TriggeredDelivery>,
}

impl DiscoveryResult {
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            links_found: 0,
            new_articles: 0,
            triggered: Vec::new(),
        }
    }
}

/// Outcome of one delivery run: either skipped or delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub skipped: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delivered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryResult {
    pub fn skipped(url: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: true,
            url: url.into(),
            reason: Some(ALREADY_PROCESSED_REASON.to_string()),
            title: None,
            summary: None,
            delivered: None,
            delivered_at: None,
        }
    }

    pub fn delivered(article: &Article, summary: String, delivered_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            skipped: false,
            url: article.url.clone(),
            reason: None,
            title: Some(article.title.clone()),
            summary: Some(summary),
            delivered: Some(true),
            delivered_at: Some(delivered_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Discovery,
    Delivery,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunType::Discovery => write!(f, "discovery"),
            RunType::Delivery => write!(f, "delivery"),
        }
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discovery" => Ok(RunType::Discovery),
            "delivery" => Ok(RunType::Delivery),
            other => Err(format!("unknown run type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Complete,
    Errored,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Errored)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: String,
    pub run_type: RunType,
    pub state: RunState,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Response of a manual trigger. Failures are reported here, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub run_type: RunType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl TriggerResponse {
    pub fn accepted(run_type: RunType, run_id: impl Into<String>) -> Self {
        Self {
            success: true,
            run_type,
            run_id: Some(run_id.into()),
            error: None,
        }
    }

    pub fn failed(run_type: RunType, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            run_type,
            run_id: None,
            error: Some(error.to_string()),
        }
    }
}
