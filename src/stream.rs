//! Server-Sent Events framing and chat event decoding.
//!
//! The chat API answers with an SSE stream whose `data:` payloads are JSON
//! objects tagged by `type`. This module turns that byte stream into a
//! closed set of [`ChatEvent`]s, decoded once at the boundary:
//!
//! | Wire `type` | Decoded as |
//! |-------------|------------|
//! | `content-delta` | [`ChatEvent::ContentDelta`] |
//! | `message-end` | [`ChatEvent::Completion`] |
//! | `error` | [`ChatEvent::Error`] |
//! | anything else | skipped |
//!
//! Framing follows the SSE rules that matter here: events end at a blank
//! line, `\r\n` is accepted, several `data:` lines in one event are joined
//! with `\n`, and comment or `event:` lines are ignored.

use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;

/// A decoded event from a streaming chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A piece of generated text.
    ContentDelta { text: String },
    /// The model finished; no more deltas follow.
    Completion { finish_reason: Option<String> },
    /// The provider reported a failure mid-stream.
    Error { message: String },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireEvent {
    #[serde(rename = "content-delta")]
    ContentDelta { delta: DeltaBody },
    #[serde(rename = "message-end")]
    MessageEnd {
        #[serde(default)]
        delta: Option<EndBody>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct DeltaBody {
    message: DeltaMessage,
}

#[derive(Deserialize)]
struct DeltaMessage {
    content: DeltaContent,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct EndBody {
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Decode one SSE `data` payload. Returns `Ok(None)` for event kinds that
/// carry nothing the caller needs.
pub fn decode_event(data: &str) -> Result<Option<ChatEvent>> {
    let wire: WireEvent = serde_json::from_str(data)
        .with_context(|| format!("Malformed chat stream event: {}", data))?;

    Ok(match wire {
        WireEvent::ContentDelta { delta } => Some(ChatEvent::ContentDelta {
            text: delta.message.content.text,
        }),
        WireEvent::MessageEnd { delta } => Some(ChatEvent::Completion {
            finish_reason: delta.and_then(|d| d.finish_reason),
        }),
        WireEvent::Error { message } => Some(ChatEvent::Error {
            message: message.unwrap_or_else(|| "unknown stream error".to_string()),
        }),
        WireEvent::Other => None,
    })
}

/// Incremental SSE frame splitter.
///
/// Feed it raw bytes as they arrive; it yields the joined `data` payload
/// of every complete event.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
    /// Bytes of an incomplete UTF-8 sequence carried to the next push.
    pending: Vec<u8>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return the payloads of all events now complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(valid_up_to);
        self.buffer.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending = rest;
        // A CR and its LF may arrive in different pushes
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut payloads = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..end + 2).collect();
            if let Some(data) = data_of(&block) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing event the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let block = std::mem::take(&mut self.buffer);
        data_of(&block)
    }
}

fn data_of(block: &str) -> Option<String> {
    let lines: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if lines.is_empty() {
        return None;
    }
    let data = lines.join("\n");
    if data.trim().is_empty() || data.trim() == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Adapts a response byte stream into a stream of [`ChatEvent`]s.
pub struct EventStream<S> {
    inner: S,
    framer: SseFramer,
    ready: std::collections::VecDeque<String>,
    done: bool,
}

impl<S> EventStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            framer: SseFramer::new(),
            ready: std::collections::VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = Result<ChatEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            while let Some(data) = self.ready.pop_front() {
                match decode_event(&data) {
                    Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
                    Ok(None) => continue,
                    Err(e) => return Poll::Ready(Some(Err(e))),
                }
            }

            if self.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let payloads = self.framer.push(&bytes);
                    self.ready.extend(payloads);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(
                        anyhow::Error::new(e).context("Chat stream interrupted")
                    )));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    if let Some(data) = self.framer.finish() {
                        self.ready.push_back(data);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
