//! External service clients shared by every session.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::chat::{ChatClient, CohereChat};
use crate::config::{Config, Secrets};
use crate::embedding::{CohereEmbedder, Embedder};
use crate::index::{InMemoryIndex, PineconeIndex, VectorIndex};

/// The three clients a session needs, injected at construction.
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub chat: Arc<dyn ChatClient>,
}

impl Providers {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self {
            embedder,
            index,
            chat,
        }
    }

    /// Build the clients named in `config`.
    ///
    /// | Setting | Values |
    /// |---------|--------|
    /// | `embedding.provider` | `"cohere"` |
    /// | `vector.provider` | `"pinecone"`, `"memory"` |
    /// | `chat.provider` | `"cohere"` |
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = match config.embedding.provider.as_str() {
            "cohere" => Arc::new(CohereEmbedder::new(
                &config.embedding,
                &secrets.cohere_api_key,
            )?),
            other => bail!("Unknown embedding provider: {}", other),
        };

        let index: Arc<dyn VectorIndex> = match config.vector.provider.as_str() {
            "pinecone" => {
                let key = secrets
                    .pinecone_api_key
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("PINECONE_API_KEY not set"))?;
                Arc::new(PineconeIndex::new(&config.vector, key)?)
            }
            "memory" => Arc::new(InMemoryIndex::new()),
            other => bail!("Unknown vector provider: {}", other),
        };

        let chat: Arc<dyn ChatClient> = match config.chat.provider.as_str() {
            "cohere" => Arc::new(CohereChat::new(&config.chat, &secrets.cohere_api_key)?),
            other => bail!("Unknown chat provider: {}", other),
        };

        tracing::info!(
            embedding = embedder.model_name(),
            vector = %config.vector.provider,
            chat = chat.model_name(),
            "providers ready"
        );

        Ok(Self::new(embedder, index, chat))
    }
}
