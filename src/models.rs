//! Core data models used throughout docqa.
//!
//! These types represent the chunks, retrieval results, chat messages and
//! conversation turns that flow through ingestion and question answering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chunk of a document's extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// `"{document_id}-{chunk_index}"`, unique within a document.
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 hex digest of `text`.
    pub hash: String,
}

/// A chunk returned by similarity search for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role/content message as sent to the chat API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed question/answer exchange as shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
    pub sources: Vec<RetrievedChunk>,
    pub asked_at: DateTime<Utc>,
}
