//! Per-user session state.
//!
//! A [`Session`] is the explicit context every surface works through: it
//! holds at most one active document (with its vector store and chatbot),
//! the display history, and the external clients it was constructed with.
//!
//! ```text
//!   Empty ──upload──▶ Processing ──ok──▶ Ready ◀──▶ Responding
//!     ▲                   │                │
//!     └──────error────────┘                └──new file──▶ Processing
//! ```
//!
//! Document identity is the SHA-256 of the uploaded bytes, so re-uploading
//! the same file under another name reuses the index, while a changed file
//! with the same name is processed again. The uploaded bytes are staged in
//! a temporary file that lives exactly as long as the active document.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use uuid::Uuid;

use crate::chatbot::{ChatResponse, Chatbot};
use crate::config::Config;
use crate::models::{ConversationTurn, RetrievedChunk};
use crate::providers::Providers;
use crate::stream::ChatEvent;
use crate::vectorstore::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    Processing,
    Ready,
    Responding,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document loaded; upload a PDF first")]
    NoDocument,
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("error processing PDF: {0:#}")]
    Ingestion(anyhow::Error),
    #[error("error generating response: {0:#}")]
    Generation(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// A new document was indexed.
    Processed { chunks: usize },
    /// The same bytes are already loaded; nothing was rebuilt.
    Unchanged { chunks: usize },
}

impl UploadOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            UploadOutcome::Processed { chunks } | UploadOutcome::Unchanged { chunks } => *chunks,
        }
    }
}

struct ActiveDocument {
    name: String,
    content_hash: String,
    /// Deleted from disk when the document is replaced or the session ends.
    upload: NamedTempFile,
    chatbot: Chatbot,
}

pub struct Session {
    id: Uuid,
    config: Arc<Config>,
    providers: Providers,
    state: SessionState,
    document: Option<ActiveDocument>,
    history: Vec<ConversationTurn>,
}

impl Session {
    pub fn new(config: Arc<Config>, providers: Providers) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            providers,
            state: SessionState::Empty,
            document: None,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document.as_ref().map(|d| d.name.as_str())
    }

    pub fn chunk_count(&self) -> usize {
        self.document
            .as_ref()
            .map_or(0, |d| d.chatbot.store().chunks().len())
    }

    /// Where the active upload is staged on disk.
    pub fn upload_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.upload.path())
    }

    pub fn chatbot(&self) -> Option<&Chatbot> {
        self.document.as_ref().map(|d| &d.chatbot)
    }

    /// Completed turns, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Load `bytes` as the session's document.
    ///
    /// Identical bytes are a no-op. Anything else resets the session:
    /// display history is cleared and the previous document, its chatbot
    /// and its staged file are dropped before the new one is processed.
    pub async fn upload(&mut self, name: &str, bytes: &[u8]) -> Result<UploadOutcome, SessionError> {
        let content_hash = hex::encode(Sha256::digest(bytes));

        if self.state == SessionState::Ready {
            if let Some(doc) = self.document.as_mut() {
                if doc.content_hash == content_hash {
                    tracing::info!(session = %self.id, name, "document unchanged, reusing index");
                    doc.name = name.to_string();
                    return Ok(UploadOutcome::Unchanged {
                        chunks: doc.chatbot.store().chunks().len(),
                    });
                }
            }
        }

        tracing::info!(
            session = %self.id,
            name,
            bytes = bytes.len(),
            hash = %&content_hash[..12],
            "processing new document"
        );
        self.history.clear();
        self.document = None;
        self.state = SessionState::Processing;

        match self.process(name, bytes, content_hash).await {
            Ok(doc) => {
                let chunks = doc.chatbot.store().chunks().len();
                self.document = Some(doc);
                self.state = SessionState::Ready;
                Ok(UploadOutcome::Processed { chunks })
            }
            Err(e) => {
                tracing::warn!(session = %self.id, name, error = %e, "document processing failed");
                self.state = SessionState::Empty;
                Err(SessionError::Ingestion(e))
            }
        }
    }

    async fn process(
        &self,
        name: &str,
        bytes: &[u8],
        content_hash: String,
    ) -> anyhow::Result<ActiveDocument> {
        let dir = self.config.session.upload_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;

        let mut upload = tempfile::Builder::new()
            .prefix("docqa-upload-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .context("Failed to create temporary upload file")?;
        upload
            .write_all(bytes)
            .and_then(|_| upload.flush())
            .context("Failed to write uploaded file")?;

        let document_id = content_hash[..16].to_string();
        let namespace = format!("{}-{}", self.id, document_id);

        let store = VectorStore::ingest(
            upload.path(),
            &document_id,
            &namespace,
            self.providers.embedder.clone(),
            self.providers.index.clone(),
            &self.config,
        )
        .await?;
        let chatbot = Chatbot::new(store, self.providers.chat.clone(), &self.config.chat);

        Ok(ActiveDocument {
            name: name.to_string(),
            content_hash,
            upload,
            chatbot,
        })
    }

    /// Answer `query` against the active document.
    ///
    /// `on_token` sees every piece of text as it streams in. The finished
    /// turn is recorded in both histories and returned. On failure neither
    /// history changes.
    pub async fn ask(
        &mut self,
        query: &str,
        mut on_token: impl FnMut(&str),
    ) -> Result<ConversationTurn, SessionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SessionError::EmptyQuery);
        }
        let doc = match self.document.as_mut() {
            Some(doc) if self.state == SessionState::Ready => doc,
            _ => return Err(SessionError::NoDocument),
        };

        self.state = SessionState::Responding;
        let result = generate(&doc.chatbot, query, &mut on_token).await;
        self.state = SessionState::Ready;

        let (response, sources) = result.map_err(SessionError::Generation)?;
        doc.chatbot.update_history(query, &response);

        let turn = ConversationTurn {
            query: query.to_string(),
            response,
            sources,
            asked_at: Utc::now(),
        };
        self.history.push(turn.clone());
        Ok(turn)
    }

    /// Clear both the display history and the chatbot's model context.
    pub fn clear_history(&mut self) {
        self.history.clear();
        if let Some(doc) = self.document.as_mut() {
            doc.chatbot.clear_history();
        }
    }
}

async fn generate(
    chatbot: &Chatbot,
    query: &str,
    on_token: &mut impl FnMut(&str),
) -> anyhow::Result<(String, Vec<RetrievedChunk>)> {
    let ChatResponse {
        mut events,
        sources,
    } = chatbot.respond(query).await?;

    let mut answer = String::new();
    while let Some(event) = events.next().await {
        match event? {
            ChatEvent::ContentDelta { text } => {
                if !text.is_empty() {
                    answer.push_str(&text);
                    on_token(&text);
                }
            }
            ChatEvent::Completion { finish_reason } => {
                tracing::debug!(?finish_reason, chars = answer.len(), "chat stream complete");
                break;
            }
            ChatEvent::Error { message } => {
                anyhow::bail!("chat stream reported an error: {}", message);
            }
        }
    }

    Ok((answer, sources))
}
