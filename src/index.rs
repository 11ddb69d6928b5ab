//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the seam to the external vector database:
//! upsert `(id, vector, metadata)` records into a namespace, and query a
//! namespace for the nearest neighbours of a vector.
//!
//! - **[`PineconeIndex`]** talks to a Pinecone index data plane over HTTP.
//! - **[`InMemoryIndex`]** keeps records in process and scores them with
//!   brute-force cosine similarity; used for local runs and tests.
//!
//! Neither implementation deletes or deduplicates: each upload writes into
//! its own namespace.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VectorConfig;
use crate::embedding::cosine_similarity;

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub text: String,
    #[serde(deserialize_with = "index_from_number")]
    pub chunk_index: usize,
}

/// Pinecone stores numeric metadata as floats and may return `3.0` for `3`.
fn index_from_number<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n = f64::deserialize(deserializer)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!(
            "chunk_index must be a non-negative integer, got {}",
            n
        )));
    }
    Ok(n as usize)
}

/// A vector to upsert.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records in `namespace`.
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `top_k` matches ordered by descending score.
    async fn query(&self, namespace: &str, vector: &[f32], top_k: usize)
        -> Result<Vec<IndexMatch>>;
}

// ============ Pinecone ============

const PINECONE_API_VERSION: &str = "2024-07";

pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    batch_size: usize,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexRecord],
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
struct PineconeMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<RecordMetadata>,
}

impl PineconeIndex {
    pub fn new(config: &VectorConfig, api_key: &str) -> Result<Self> {
        let host = config
            .index_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| anyhow::anyhow!("vector.index_host required for Pinecone"))?;

        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            host,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Pinecone request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Pinecone API error {} on {}: {}", status, path, body_text);
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        for batch in records.chunks(self.batch_size) {
            self.post(
                "/vectors/upsert",
                &UpsertRequest {
                    vectors: batch,
                    namespace,
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let response = self
            .post(
                "/query",
                &QueryRequest {
                    namespace,
                    vector,
                    top_k,
                    include_metadata: true,
                    include_values: false,
                },
            )
            .await?;

        let parsed: QueryResponse = response
            .json()
            .await
            .context("Invalid Pinecone query response")?;

        Ok(parsed
            .matches
            .into_iter()
            .filter_map(|m| match m.metadata {
                Some(metadata) => Some(IndexMatch {
                    id: m.id,
                    score: m.score,
                    metadata,
                }),
                None => {
                    tracing::warn!(id = %m.id, "Pinecone match without metadata skipped");
                    None
                }
            })
            .collect())
    }
}

// ============ In-memory ============

/// In-process index keyed by namespace, then record ID.
#[derive(Default)]
pub struct InMemoryIndex {
    namespaces: RwLock<HashMap<String, HashMap<String, IndexRecord>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .map(|ns| ns.get(namespace).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, namespace: &str, records: &[IndexRecord]) -> Result<()> {
        let mut namespaces = self
            .namespaces
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory index lock poisoned"))?;
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            ns.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let namespaces = self
            .namespaces
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory index lock poisoned"))?;
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<IndexMatch> = ns
            .values()
            .map(|r| IndexMatch {
                id: r.id.clone(),
                score: cosine_similarity(vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}
