//! Retrieval-augmented chatbot.
//!
//! The [`Chatbot`] pairs one [`VectorStore`] with a [`ChatClient`]. For each
//! question it retrieves context, builds a single prompt, and opens a
//! streaming completion over `history + prompt`. Consuming the stream is
//! the caller's job; once the full answer is known the caller reports it
//! back through [`Chatbot::update_history`].
//!
//! History keeps the plain questions, not the context-augmented prompts,
//! and is capped at `chat.history_exchanges` exchanges.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::chat::{ChatClient, ChatEventStream};
use crate::config::ChatConfig;
use crate::models::{ChatMessage, RetrievedChunk};
use crate::vectorstore::VectorStore;

/// Opening line of every prompt built without context.
pub const NO_CONTEXT_NOTICE: &str =
    "No relevant information was found in the uploaded document for this question.";

/// A streaming answer plus the chunks it was grounded on.
pub struct ChatResponse {
    pub events: ChatEventStream,
    pub sources: Vec<RetrievedChunk>,
}

pub struct Chatbot {
    store: VectorStore,
    client: Arc<dyn ChatClient>,
    history: Vec<ChatMessage>,
    max_history_messages: usize,
    conversation_id: Uuid,
}

impl Chatbot {
    pub fn new(store: VectorStore, client: Arc<dyn ChatClient>, config: &ChatConfig) -> Self {
        Self {
            store,
            client,
            history: Vec::new(),
            max_history_messages: config.max_history_messages(),
            conversation_id: Uuid::new_v4(),
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Retrieve context for `query` and start streaming an answer.
    pub async fn respond(&self, query: &str) -> Result<ChatResponse> {
        let sources = self.store.retrieve(query).await?;
        let prompt = build_prompt(query, &sources);

        let mut messages = self.history.clone();
        messages.push(ChatMessage::user(prompt));

        tracing::debug!(
            conversation = %self.conversation_id,
            sources = sources.len(),
            history = self.history.len(),
            "sending chat request"
        );

        let events = self.client.stream_chat(&messages).await?;
        Ok(ChatResponse { events, sources })
    }

    /// Record a finished exchange, keeping only the most recent messages.
    pub fn update_history(&mut self, query: &str, response: &str) {
        self.history.push(ChatMessage::user(query));
        self.history.push(ChatMessage::assistant(response));

        if self.history.len() > self.max_history_messages {
            let excess = self.history.len() - self.max_history_messages;
            self.history.drain(..excess);
        }
    }

    /// Forget the conversation and start a new one.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.conversation_id = Uuid::new_v4();
    }
}

/// Build the user prompt for `query`.
///
/// With sources, the prompt lists them as `Document 1..n` and asks for an
/// answer drawn only from them. Without sources, it tells the model that
/// nothing relevant was found so it can say so to the user.
pub fn build_prompt(query: &str, sources: &[RetrievedChunk]) -> String {
    if sources.is_empty() {
        return format!(
            "{}\n\nLet the user know that the document does not appear to cover this, \
             and do not invent an answer.\n\nQuestion: {}",
            NO_CONTEXT_NOTICE, query
        );
    }

    let context = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("Document {}: {}", i + 1, s.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following context from the document, please answer the question.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Please provide a clear and concise answer based solely on the information in the context above.",
        context, query
    )
}
