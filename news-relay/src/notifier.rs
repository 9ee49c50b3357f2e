use crate::config::TelegramConfig;
use crate::traits::Notifier;
use crate::types::{RelayError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wraps a notifier with the image fallback contract: a send that fails with
/// the supplied image is tried exactly once more with the fallback image.
pub struct FallbackImageNotifier {
    inner: Arc<dyn Notifier>,
    fallback_image_url: String,
}

impl FallbackImageNotifier {
    pub fn new(inner: Arc<dyn Notifier>, fallback_image_url: impl Into<String>) -> Self {
        Self {
            inner,
            fallback_image_url: fallback_image_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for FallbackImageNotifier {
    fn name(&self) -> String {
        format!("{} (image fallback)", self.inner.name())
    }

    async fn send(&self, message: &str, image_url: &str, link: &str) -> Result<()> {
        match self.inner.send(message, image_url, link).await {
            Ok(()) => Ok(()),
            Err(e) if image_url != self.fallback_image_url => {
                warn!(
                    image_url,
                    error = %e,
                    "Send failed with article image, retrying with fallback image"
                );
                self.inner.send(message, &self.fallback_image_url, link).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Dry-run notifier that only logs what would be sent.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> String {
        "log".to_string()
    }

    async fn send(&self, message: &str, image_url: &str, link: &str) -> Result<()> {
        info!(image_url, link, "Notification (dry run):\n{}", message);
        Ok(())
    }
}

#[derive(Serialize)]
struct SendPhotoRequest<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
    reply_markup: InlineKeyboard<'a>,
}

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<Vec<InlineButton<'a>>>,
}

#[derive(Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    url: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts the message as a photo caption to a Telegram chat, with the article
/// link as an inline button.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendPhoto",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> String {
        "telegram".to_string()
    }

    async fn send(&self, message: &str, image_url: &str, link: &str) -> Result<()> {
        let request = SendPhotoRequest {
            chat_id: &self.config.chat_id,
            photo: image_url,
            caption: message,
            parse_mode: "HTML",
            reply_markup: InlineKeyboard {
                inline_keyboard: vec![vec![InlineButton {
                    text: "Read more",
                    url: link,
                }]],
            },
        };

        let response = self.client.post(self.endpoint()).json(&request).send().await?;
        let status = response.status();
        let body: TelegramResponse = response.json().await.map_err(|e| {
            RelayError::General(format!("unreadable Telegram response (HTTP {}): {}", status, e))
        })?;

        if !body.ok {
            return Err(RelayError::General(format!(
                "Telegram rejected message (HTTP {}): {}",
                status,
                body.description.unwrap_or_else(|| "no description".to_string())
            )));
        }

        info!(link, "Notification delivered to Telegram chat {}", self.config.chat_id);
        Ok(())
    }
}
