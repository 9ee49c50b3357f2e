use std::time::Duration;

pub use interfaces::defs::{
    Article, CacheEntry, DeliveryResult, DeliveryUnit, DiscoveryParams, DiscoveryResult,
    FeedEntryMeta, RunState, RunStatus, RunType, TriggerResponse, TriggeredDelivery,
    ALREADY_PROCESSED_REASON, TRIGGERED_STATUS,
};

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_document_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum gap between two requests to the same host.
    pub min_host_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "News-Relay/1.0".to_string(),
            timeout_seconds: 30,
            max_document_size_mb: 10,
            max_redirects: 5,
            min_host_interval_ms: 1000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Step '{step}' timed out after {seconds}s")]
    Timeout { step: String, seconds: u64 },

    #[error("Step '{step}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        #[source]
        source: Box<RelayError>,
    },

    #[error("Summarizer returned no usable summary")]
    EmptySummary,

    #[error("Failed to summarize {url}: {reason}")]
    SummaryFailed { url: String, reason: String },

    #[error("Failed to send notification for {url}: {reason}")]
    NotificationFailed { url: String, reason: String },

    #[error("Failed to record delivery of {url}: {reason}")]
    RecordFailed { url: String, reason: String },

    #[error("Bulk read of {requested} keys exceeds the limit of {limit}")]
    BulkLimitExceeded { requested: usize, limit: usize },

    #[error("No {run_type} run with id {run_id}")]
    RunNotFound { run_type: RunType, run_id: String },

    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    #[error("Document too large: {size_mb}MB")]
    DocumentTooLarge { size_mb: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
