//! # docqa
//!
//! Ask questions about a PDF and get answers grounded in its own text.
//!
//! An uploaded document is extracted, split into overlapping chunks,
//! embedded, and written to a vector index. Each question retrieves the
//! closest chunks, which are handed to a chat model together with the
//! recent conversation; the answer streams back with its sources.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   PDF    │──▶│ Chunk+Embed  │──▶│ Vector index │
//! │ upload   │   │  (Cohere)    │   │ (Pinecone)   │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │ top-k
//!                                          ▼
//!                 ┌──────────┐       ┌──────────────┐
//!                 │ Session  │◀──────│   Chatbot    │◀── streamed chat
//!                 └────┬─────┘       └──────────────┘
//!                ┌─────┴─────┐
//!                ▼           ▼
//!           ┌────────┐  ┌────────┐
//!           │  HTTP  │  │  REPL  │
//!           └────────┘  └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and API keys |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index abstraction |
//! | [`vectorstore`] | Ingestion pipeline and retrieval |
//! | [`stream`] | Chat event stream decoding |
//! | [`chat`] | Streaming chat provider abstraction |
//! | [`chatbot`] | Prompt building and conversation memory |
//! | [`providers`] | Client wiring from configuration |
//! | [`session`] | Per-user session state |
//! | [`render`] | Plain-text rendering of sources |
//! | [`server`] | HTTP server |
//! | [`repl`] | Terminal chat |
//! | [`inspect`] | Offline extraction report |

pub mod chat;
pub mod chatbot;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod inspect;
pub mod models;
pub mod providers;
pub mod render;
pub mod repl;
pub mod server;
pub mod session;
pub mod stream;
pub mod vectorstore;
