//! Embedding provider abstraction and the Cohere implementation.
//!
//! Defines the [`Embedder`] trait and:
//! - **[`CohereEmbedder`]**: calls Cohere's `POST /v2/embed` endpoint in
//!   batches of `embedding.batch_size` texts.
//! - [`cosine_similarity`]: similarity between two embedding vectors, used
//!   by the in-memory index.
//!
//! Documents and queries are embedded with different [`InputType`]s, as the
//! Cohere v3 models expect.
//!
//! Failures are returned as-is: there is no retry or backoff, so a
//! transient API error fails the ingestion or query that triggered it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// What an embedding will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    SearchDocument,
    SearchQuery,
}

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"embed-english-v3.0"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed`] for retrieval queries.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder
        .embed(&[text.to_string()], InputType::SearchQuery)
        .await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Cohere Provider ============

/// Embedding provider using the Cohere v2 API.
pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: InputType,
    embedding_types: [&'static str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbeddingsByType,
}

#[derive(Deserialize)]
struct EmbeddingsByType {
    #[serde(default)]
    float: Option<Vec<Vec<f32>>>,
}

impl CohereEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            bail!("Cohere API key is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint: format!("{}/v2/embed", config.base_url.trim_end_matches('/')),
            batch_size: config.batch_size.max(1),
        })
    }

    async fn embed_batch(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: &self.model,
            texts,
            input_type,
            embedding_types: ["float"],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Cohere embed request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Cohere embed API error {}: {}", status, body_text);
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("Invalid Cohere embed response")?;
        let vectors = parsed
            .embeddings
            .float
            .ok_or_else(|| anyhow::anyhow!("Invalid Cohere embed response: missing float embeddings"))?;

        if vectors.len() != texts.len() {
            bail!(
                "Cohere embed returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            );
        }

        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            tracing::debug!(count = batch.len(), ?input_type, "embedding batch");
            out.extend(self.embed_batch(batch, input_type).await?);
        }
        Ok(out)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`; `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
