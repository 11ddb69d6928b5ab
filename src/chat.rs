//! Chat completion client.
//!
//! [`ChatClient`] is the seam to the hosted LLM: given the message history
//! it opens a streaming completion and hands back a [`ChatEventStream`].
//! [`CohereChat`] implements it against Cohere's `POST /v2/chat` with
//! `stream: true`; the SSE body is decoded by [`crate::stream`].

use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::config::ChatConfig;
use crate::models::ChatMessage;
use crate::stream::{ChatEvent, EventStream};

/// Decoded events of one streaming completion.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the model identifier (e.g. `"command-r-plus-08-2024"`).
    fn model_name(&self) -> &str;

    /// Start a streaming completion over `messages`.
    ///
    /// Errors returned here mean the request was refused before any event
    /// arrived; failures after that come through the stream.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChatEventStream>;
}

pub struct CohereChat {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

impl CohereChat {
    pub fn new(config: &ChatConfig, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            bail!("Cohere API key is empty");
        }

        // No overall timeout: a long answer keeps the response open.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: format!("{}/v2/chat", config.base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ChatClient for CohereChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChatEventStream> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .context("Cohere chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Cohere chat API error {}: {}", status, body_text);
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "chat stream opened");
        Ok(Box::pin(EventStream::new(Box::pin(response.bytes_stream()))))
    }
}
