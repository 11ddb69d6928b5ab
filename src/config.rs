//! TOML configuration and environment secrets.
//!
//! Every section has defaults, so a config file only needs to name the
//! values it changes. API keys are never read from the file: they come
//! from the hosting environment via [`Secrets::from_env`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared between consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Matches scoring below this are not treated as relevant context.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_cohere")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_cohere_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_cohere(),
            model: default_embedding_model(),
            base_url: default_cohere_base_url(),
            batch_size: default_embedding_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_cohere() -> String {
    "cohere".to_string()
}
fn default_embedding_model() -> String {
    "embed-english-v3.0".to_string()
}
fn default_cohere_base_url() -> String {
    "https://api.cohere.com".to_string()
}
fn default_embedding_batch_size() -> usize {
    96
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `"pinecone"` or `"memory"`.
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    /// Data-plane host of the Pinecone index, e.g. `https://docs-abc123.svc.pinecone.io`.
    #[serde(default)]
    pub index_host: Option<String>,
    #[serde(default = "default_vector_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            index_host: None,
            batch_size: default_vector_batch_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_vector_provider() -> String {
    "pinecone".to_string()
}
fn default_vector_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_cohere")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_cohere_base_url")]
    pub base_url: String,
    /// Number of question/answer exchanges kept as model context.
    #[serde(default = "default_history_exchanges")]
    pub history_exchanges: usize,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_cohere(),
            model: default_chat_model(),
            base_url: default_cohere_base_url(),
            history_exchanges: default_history_exchanges(),
            connect_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "command-r-plus-08-2024".to_string()
}
fn default_history_exchanges() -> usize {
    10
}

impl ChatConfig {
    /// Maximum number of role/content messages kept in chatbot history.
    pub fn max_history_messages(&self) -> usize {
        self.history_exchanges * 2
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sessions idle longer than this are ended; `0` keeps them forever.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}
fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_session_ttl_secs() -> u64 {
    60 * 60
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    /// Where uploaded PDFs are staged while a session holds them.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Config {
    /// All-defaults configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            bail!("retrieval.min_score must be in [-1.0, 1.0]");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.vector.batch_size == 0 {
            bail!("vector.batch_size must be > 0");
        }
        if self.chat.history_exchanges == 0 {
            bail!("chat.history_exchanges must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "cohere" => {}
            other => bail!("Unknown embedding provider: '{}'. Must be cohere.", other),
        }

        match self.vector.provider.as_str() {
            "pinecone" => {
                if self.vector.index_host.as_deref().map_or(true, str::is_empty) {
                    bail!("vector.index_host must be set when provider is 'pinecone'");
                }
            }
            "memory" => {}
            other => bail!(
                "Unknown vector provider: '{}'. Must be pinecone or memory.",
                other
            ),
        }

        match self.chat.provider.as_str() {
            "cohere" => {}
            other => bail!("Unknown chat provider: '{}'. Must be cohere.", other),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// API keys supplied by the hosting environment.
#[derive(Clone)]
pub struct Secrets {
    pub cohere_api_key: String,
    pub pinecone_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("cohere_api_key", &"<redacted>")
            .field(
                "pinecone_api_key",
                &self.pinecone_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Secrets {
    /// Reads `COHERE_API_KEY` and, when the Pinecone index is configured,
    /// `PINECONE_API_KEY`.
    pub fn from_env(config: &Config) -> Result<Self> {
        let cohere_api_key = std::env::var("COHERE_API_KEY")
            .map_err(|_| anyhow::anyhow!("COHERE_API_KEY environment variable not set"))?;

        let pinecone_api_key = if config.vector.provider == "pinecone" {
            Some(
                std::env::var("PINECONE_API_KEY").map_err(|_| {
                    anyhow::anyhow!("PINECONE_API_KEY environment variable not set")
                })?,
            )
        } else {
            None
        };

        Ok(Self {
            cohere_api_key,
            pinecone_api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse(
            r#"
            [vector]
            provider = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.chat.max_history_messages(), 20);
        assert_eq!(config.chat.model, "command-r-plus-08-2024");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let err = parse(
            r#"
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
            [vector]
            provider = "memory"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_pinecone_requires_index_host() {
        let err = parse("").unwrap_err();
        assert!(err.to_string().contains("index_host"));

        let config = parse(
            r#"
            [vector]
            provider = "pinecone"
            index_host = "https://docs-abc.svc.pinecone.io"
            "#,
        )
        .unwrap();
        assert_eq!(config.vector.batch_size, 100);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = parse(
            r#"
            [vector]
            provider = "qdrant"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown vector provider"));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let err = parse(
            r#"
            [retrieval]
            top_k = 0
            [vector]
            provider = "memory"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("top_k"));
    }

    #[test]
    fn test_load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        std::fs::write(
            &path,
            "[vector]\nprovider = \"memory\"\n[server]\nbind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.session_ttl_secs, 3600);
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/docqa.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chat.max_history_messages(), 20);
    }

    #[test]
    fn test_secrets_debug_redacts() {
        let secrets = Secrets {
            cohere_api_key: "co-secret".to_string(),
            pinecone_api_key: Some("pc-secret".to_string()),
        };
        let shown = format!("{:?}", secrets);
        assert!(!shown.contains("co-secret"));
        assert!(!shown.contains("pc-secret"));
    }
}
