use crate::types::{FetchConfig, RelayError, Result};
use crate::utils::url::extract_host;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Single-attempt HTTP document fetcher. Retries belong to the calling step.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    /// Next free request slot per host.
    rate_limiter: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// GETs `url` and returns the body as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let started = Instant::now();
        debug!("Fetching document: {}", url);

        self.apply_rate_limit(url).await?;

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(RelayError::General(format!(
                "HTTP {}: {}",
                status,
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_document_size_mb {
                return Err(RelayError::DocumentTooLarge { size_mb });
            }
        }

        let body = response.text().await?;
        info!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            started.elapsed().as_millis()
        );
        Ok(body)
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let host = extract_host(url).ok_or_else(|| RelayError::General(format!("URL has no host: {}", url)))?;
        let wait_time = self.reserve_slot(&host).await;

        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }
        Ok(())
    }

    /// Claims the next request slot for `host` and returns how long to wait
    /// for it. The lock is released before anyone sleeps.
    async fn reserve_slot(&self, host: &str) -> Duration {
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);
        let now = Instant::now();

        let mut rate_limiter = self.rate_limiter.lock().await;
        let slot = match rate_limiter.get(host) {
            Some(previous) => (*previous + min_interval).max(now),
            None => now,
        };
        rate_limiter.insert(host.to_string(), slot);

        slot - now
    }
}
