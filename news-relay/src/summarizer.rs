use crate::config::LlmConfig;
use crate::traits::Summarizer;
use crate::types::{RelayError, Result};
use crate::utils::text;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You summarize news articles for a notification channel. \
Reply with two or three plain sentences covering the key facts. No preamble, no markdown.";

/// Offline summarizer that keeps the leading sentences of the text.
pub struct ExtractiveSummarizer {
    sentences: usize,
    max_chars: usize,
}

impl ExtractiveSummarizer {
    pub fn new() -> Self {
        Self {
            sentences: 2,
            max_chars: 400,
        }
    }

    pub fn with_sentences(mut self, sentences: usize) -> Self {
        self.sentences = sentences.max(1);
        self
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> String {
        format!("extractive ({} sentences)", self.sentences)
    }

    async fn summarize(&self, input: &str) -> Result<Option<String>> {
        let cleaned = text::collapse_whitespace(input);
        let summary = text::smart_truncate(&text::leading_sentences(&cleaned, self.sentences), self.max_chars);

        Ok(Some(summary).filter(|s| !s.is_empty()))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct ChatSummarizer {
    client: Client,
    config: LlmConfig,
    max_input_chars: usize,
}

impl ChatSummarizer {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(55)).build()?;

        Ok(Self {
            client,
            config,
            max_input_chars: 12_000,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    fn name(&self) -> String {
        format!("chat ({})", self.config.model)
    }

    async fn summarize(&self, input: &str) -> Result<Option<String>> {
        let input = text::smart_truncate(input, self.max_input_chars);
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &input,
                },
            ],
            temperature: 0.2,
            max_tokens: 300,
        };

        debug!("Requesting summary from {} ({} chars)", self.config.model, input.len());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::General(format!(
                "summarizer returned HTTP {}: {}",
                status,
                text::smart_truncate(&body, 200)
            )));
        }

        let reply: ChatResponse = response.json().await?;
        let summary = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());

        Ok(summary)
    }
}
