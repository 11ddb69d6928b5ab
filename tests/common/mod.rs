//! Shared fixtures: a hand-built PDF and offline stand-ins for the
//! embedding and chat services.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use docqa::chat::{ChatClient, ChatEventStream};
use docqa::config::Config;
use docqa::embedding::{Embedder, InputType};
use docqa::index::InMemoryIndex;
use docqa::models::ChatMessage;
use docqa::providers::Providers;
use docqa::stream::ChatEvent;

/// One-page PDF whose only text is `phrase` (plain ASCII, no parentheses).
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

pub const VOCAB: [&str; 5] = ["apple", "volcano", "lava", "jazz", "night"];

/// Embeds text as keyword counts over [`VOCAB`].
pub struct KeywordEmbedder;

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

/// Replies with a fixed list of deltas. When `fail` is set the stream
/// ends in an error event instead of a completion.
pub struct ScriptedChat {
    reply: Vec<String>,
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub sent: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(reply: &[&str]) -> Self {
        Self {
            reply: reply.iter().map(|s| s.to_string()).collect(),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChatEventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(messages.to_vec());

        let mut events: Vec<Result<ChatEvent>> = self
            .reply
            .iter()
            .map(|text| Ok(ChatEvent::ContentDelta { text: text.clone() }))
            .collect();
        if self.fail.load(Ordering::SeqCst) {
            events.push(Ok(ChatEvent::Error {
                message: "model overloaded".to_string(),
            }));
        } else {
            events.push(Ok(ChatEvent::Completion {
                finish_reason: Some("COMPLETE".to_string()),
            }));
        }
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

pub struct Fakes {
    pub index: Arc<InMemoryIndex>,
    pub chat: Arc<ScriptedChat>,
    pub providers: Providers,
}

pub fn fakes(reply: &[&str]) -> Fakes {
    let index = Arc::new(InMemoryIndex::new());
    let chat = Arc::new(ScriptedChat::new(reply));
    let providers = Providers::new(Arc::new(KeywordEmbedder), index.clone(), chat.clone());
    Fakes {
        index,
        chat,
        providers,
    }
}

/// Defaults, with uploads staged under `upload_dir`.
pub fn test_config(upload_dir: &Path) -> Config {
    let mut config = Config::minimal();
    config.vector.provider = "memory".to_string();
    config.retrieval.min_score = 0.1;
    config.session.upload_dir = Some(upload_dir.to_path_buf());
    config
}
