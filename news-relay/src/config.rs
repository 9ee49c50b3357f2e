use crate::retry::StepPolicies;
use crate::types::{FetchConfig, RelayError, Result};
use std::env;
use std::time::Duration;

/// Prefix of every delivery marker key. Both stages must agree on it.
pub const CACHE_KEY_PREFIX: &str = "article:";

pub const DEFAULT_LISTING_URL: &str = "https://techcrunch.com/latest/";
pub const DEFAULT_FEED_URL: &str = "https://techcrunch.com/feed/";

/// Sent in place of an article image that is missing or rejected.
pub const FALLBACK_IMAGE_URL: &str =
    "https://techcrunch.com/wp-content/uploads/2018/04/tc-logo-2018-square-reverse2x.png";

/// How long a delivered article stays deduplicated.
pub const DELIVERY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Most keys a single bulk cache read may carry.
pub const CACHE_BULK_LIMIT: usize = 100;

pub const DEFAULT_SCHEDULE: Duration = Duration::from_secs(30 * 60);

/// How long ended runs stay queryable and abandoned journal steps are kept.
pub const RUN_RETENTION: Duration = Duration::from_secs(6 * 60 * 60);

pub const DEFAULT_SUMMARY_SENTENCES: usize = 2;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listing_url: String,
    pub feed_url: String,
    pub fallback_image_url: String,
    pub delivery_ttl: Duration,
    pub cache_bulk_limit: usize,
    pub schedule_interval: Duration,
    pub run_retention: Duration,
    /// CSS selector for article anchors on the listing page.
    pub listing_selector: Option<String>,
    /// Only listing links whose path starts with this are kept.
    pub listing_path_prefix: Option<String>,
    /// Sentences kept by the offline summarizer.
    pub summary_sentences: usize,
    pub fetch: FetchConfig,
    pub policies: StepPolicies,
    pub database_url: Option<String>,
    pub telegram: Option<TelegramConfig>,
    pub llm: Option<LlmConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            feed_url: DEFAULT_FEED_URL.to_string(),
            fallback_image_url: FALLBACK_IMAGE_URL.to_string(),
            delivery_ttl: DELIVERY_TTL,
            cache_bulk_limit: CACHE_BULK_LIMIT,
            schedule_interval: DEFAULT_SCHEDULE,
            run_retention: RUN_RETENTION,
            listing_selector: None,
            listing_path_prefix: None,
            summary_sentences: DEFAULT_SUMMARY_SENTENCES,
            fetch: FetchConfig::default(),
            policies: StepPolicies::default(),
            database_url: None,
            telegram: None,
            llm: None,
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by whatever the environment provides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = non_empty_var("RELAY_LISTING_URL") {
            config.listing_url = url;
        }
        if let Some(url) = non_empty_var("RELAY_FEED_URL") {
            config.feed_url = url;
        }
        if let Some(url) = non_empty_var("RELAY_FALLBACK_IMAGE_URL") {
            config.fallback_image_url = url;
        }
        if let Some(minutes) = parse_var::<u64>("RELAY_SCHEDULE_MINUTES")? {
            config.schedule_interval = Duration::from_secs(minutes * 60);
        }
        if let Some(hours) = parse_var::<u64>("RELAY_RUN_RETENTION_HOURS")? {
            config.run_retention = Duration::from_secs(hours * 60 * 60);
        }
        if let Some(sentences) = parse_var::<usize>("RELAY_SUMMARY_SENTENCES")? {
            config.summary_sentences = sentences;
        }
        config.listing_selector = non_empty_var("RELAY_LISTING_SELECTOR");
        config.listing_path_prefix = non_empty_var("RELAY_LISTING_PATH_PREFIX");

        config.database_url = non_empty_var("DATABASE_URL");

        config.telegram = match (non_empty_var("TELEGRAM_BOT_TOKEN"), non_empty_var("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig {
                bot_token,
                chat_id,
                api_base: non_empty_var("TELEGRAM_API_BASE")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            }),
            (None, None) => None,
            _ => {
                return Err(RelayError::Config(
                    "TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must be set together".to_string(),
                ))
            }
        };

        config.llm = non_empty_var("LLM_API_KEY").map(|api_key| LlmConfig {
            api_key,
            base_url: non_empty_var("LLM_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: non_empty_var("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
        });

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("listing URL", &self.listing_url),
            ("feed URL", &self.feed_url),
            ("fallback image URL", &self.fallback_image_url),
        ] {
            if !crate::utils::url::is_http_url(value) {
                return Err(RelayError::Config(format!("{} is not an http(s) URL: {}", name, value)));
            }
        }

        if self.cache_bulk_limit == 0 || self.cache_bulk_limit > CACHE_BULK_LIMIT {
            return Err(RelayError::Config(format!(
                "cache bulk limit must be between 1 and {}",
                CACHE_BULK_LIMIT
            )));
        }

        if self.summary_sentences == 0 {
            return Err(RelayError::Config("summary sentences must be at least 1".to_string()));
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match non_empty_var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RelayError::Config(format!("{} is not a number: {}", name, value))),
        None => Ok(None),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
