//! Document ingestion and retrieval.
//!
//! A [`VectorStore`] owns the chunks of exactly one uploaded document and
//! the namespace their vectors were written to. Building one runs the whole
//! ingestion pipeline (extract → chunk → embed → upsert) synchronously;
//! [`VectorStore::retrieve`] answers a query with the best-scoring chunks.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::{embed_query, Embedder, InputType};
use crate::extract::extract_pdf_file;
use crate::index::{IndexRecord, RecordMetadata, VectorIndex};
use crate::models::{Chunk, RetrievedChunk};

pub struct VectorStore {
    namespace: String,
    chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_score: f32,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("namespace", &self.namespace)
            .field("chunks", &self.chunks.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl VectorStore {
    /// Ingest the PDF at `path` into `namespace`.
    pub async fn ingest(
        path: &Path,
        document_id: &str,
        namespace: &str,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Result<Self> {
        let text = extract_pdf_file(path)?;
        tracing::info!(
            path = %path.display(),
            chars = text.chars().count(),
            "extracted PDF text"
        );
        Self::from_text(&text, document_id, namespace, embedder, index, config).await
    }

    /// Ingest already extracted text into `namespace`.
    pub async fn from_text(
        text: &str,
        document_id: &str,
        namespace: &str,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: &Config,
    ) -> Result<Self> {
        let chunks = chunk_text(
            document_id,
            text,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        );
        if chunks.is_empty() {
            bail!("Document contains no text to index");
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts, InputType::SearchDocument)
            .await
            .context("Failed to embed document chunks")?;
        if vectors.len() != chunks.len() {
            bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| IndexRecord {
                id: chunk.id.clone(),
                values,
                metadata: RecordMetadata {
                    text: chunk.text.clone(),
                    chunk_index: chunk.chunk_index,
                },
            })
            .collect();

        index
            .upsert(namespace, &records)
            .await
            .context("Failed to upsert document vectors")?;

        tracing::info!(
            namespace,
            chunks = chunks.len(),
            model = embedder.model_name(),
            "document indexed"
        );

        Ok(Self {
            namespace: namespace.to_string(),
            chunks,
            embedder,
            index,
            top_k: config.retrieval.top_k,
            min_score: config.retrieval.min_score,
        })
    }

    /// The chunks this store was built from, in document order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Return at most `top_k` chunks relevant to `query`, best first.
    ///
    /// Matches scoring below `min_score` are dropped, so an unrelated
    /// question yields an empty list rather than noise.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.embedder.as_ref(), query)
            .await
            .context("Failed to embed query")?;

        let matches = self
            .index
            .query(&self.namespace, &vector, self.top_k)
            .await
            .context("Vector index query failed")?;

        let mut results: Vec<RetrievedChunk> = matches
            .into_iter()
            .filter(|m| m.score >= self.min_score)
            .map(|m| RetrievedChunk {
                chunk_id: m.id,
                chunk_index: m.metadata.chunk_index,
                text: m.metadata.text,
                score: m.score,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(self.top_k);

        tracing::debug!(
            namespace = %self.namespace,
            hits = results.len(),
            "retrieved chunks"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexMatch, InMemoryIndex};
    use async_trait::async_trait;

    /// Embeds text as keyword counts over a fixed vocabulary.
    struct KeywordEmbedder;

    const VOCAB: [&str; 4] = ["apple", "volcano", "jazz", "river"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, texts: &[String], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|w| lower.matches(w).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    /// Returns canned matches regardless of the query, in the given order.
    struct CannedIndex(Vec<IndexMatch>);

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn upsert(&self, _namespace: &str, _records: &[IndexRecord]) -> Result<()> {
            Ok(())
        }

        async fn query(&self, _ns: &str, _v: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    fn config(chunk_size: usize, top_k: usize, min_score: f32) -> Config {
        let mut config = Config::minimal();
        config.chunking.chunk_size = chunk_size;
        config.chunking.chunk_overlap = 0;
        config.retrieval.top_k = top_k;
        config.retrieval.min_score = min_score;
        config
    }

    fn hit(id: &str, score: f32) -> IndexMatch {
        IndexMatch {
            id: id.to_string(),
            score,
            metadata: RecordMetadata {
                text: id.to_string(),
                chunk_index: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_ingest_upserts_every_chunk() {
        let index = Arc::new(InMemoryIndex::new());
        let text = "apple ".repeat(100);
        let store = VectorStore::from_text(
            &text,
            "doc",
            "ns",
            Arc::new(KeywordEmbedder),
            index.clone(),
            &config(60, 3, 0.1),
        )
        .await
        .unwrap();

        assert!(store.chunks().len() > 1);
        assert_eq!(index.len("ns"), store.chunks().len());
    }

    #[tokio::test]
    async fn test_empty_text_is_an_error() {
        let err = VectorStore::from_text(
            "   ",
            "doc",
            "ns",
            Arc::new(KeywordEmbedder),
            Arc::new(InMemoryIndex::new()),
            &config(60, 3, 0.1),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no text"));
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k_and_order() {
        // Index answers out of order; retrieve must re-sort and cap
        let index = Arc::new(CannedIndex(vec![
            hit("b", 0.5),
            hit("a", 0.9),
            hit("c", 0.7),
            hit("d", 0.6),
        ]));
        let store = VectorStore::from_text(
            "apple",
            "doc",
            "ns",
            Arc::new(KeywordEmbedder),
            index,
            &config(60, 3, 0.0),
        )
        .await
        .unwrap();

        let results = store.retrieve("apple").await.unwrap();
        assert!(results.len() <= 3);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_retrieve_drops_low_scores() {
        let index = Arc::new(CannedIndex(vec![hit("a", 0.9), hit("b", 0.1)]));
        let store = VectorStore::from_text(
            "apple",
            "doc",
            "ns",
            Arc::new(KeywordEmbedder),
            index,
            &config(60, 5, 0.3),
        )
        .await
        .unwrap();

        let results = store.retrieve("apple").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "a");
    }

    #[tokio::test]
    async fn test_retrieve_unrelated_query_is_empty() {
        let store = VectorStore::from_text(
            "Apples grow on trees in the orchard.",
            "doc",
            "ns",
            Arc::new(KeywordEmbedder),
            Arc::new(InMemoryIndex::new()),
            &config(200, 5, 0.2),
        )
        .await
        .unwrap();

        assert!(store.retrieve("jazz clubs").await.unwrap().is_empty());
    }
}
