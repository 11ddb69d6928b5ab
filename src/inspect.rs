//! Offline document inspection.
//!
//! `docqa inspect <file>` runs extraction and chunking exactly as an upload
//! would, without calling any external service, and prints what would be
//! indexed. Useful for tuning `[chunking]` against a real document.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::extract::extract_pdf;
use crate::models::Chunk;
use crate::render::source_preview;

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub bytes: usize,
    pub content_hash: String,
    /// Prefix of `content_hash` used in chunk ids.
    pub document_id: String,
    pub chars: usize,
    pub chunks: usize,
    /// Chunks with unique text. Fewer than `chunks` means repeated passages
    /// (headers, footers) that will be embedded more than once.
    pub distinct_chunks: usize,
    pub min_chunk_chars: usize,
    pub max_chunk_chars: usize,
    pub first_chunk: Option<String>,
}

/// Extract and chunk `bytes` with the current chunking settings.
pub fn inspect_document(bytes: &[u8], config: &Config) -> Result<InspectReport> {
    let content_hash = hex::encode(Sha256::digest(bytes));
    let text = extract_pdf(bytes)?;
    let document_id = content_hash[..16].to_string();
    let chunks = chunk_text(
        &document_id,
        &text,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );

    let lengths: Vec<usize> = chunks.iter().map(|c| c.text.chars().count()).collect();

    Ok(InspectReport {
        bytes: bytes.len(),
        document_id: chunks
            .first()
            .map(|c| c.document_id.clone())
            .unwrap_or(document_id),
        content_hash,
        chars: text.chars().count(),
        chunks: chunks.len(),
        distinct_chunks: distinct_chunks(&chunks),
        min_chunk_chars: lengths.iter().copied().min().unwrap_or(0),
        max_chunk_chars: lengths.iter().copied().max().unwrap_or(0),
        first_chunk: chunks.first().map(|c| source_preview(&c.text)),
    })
}

fn distinct_chunks(chunks: &[Chunk]) -> usize {
    chunks
        .iter()
        .map(|c| c.hash.as_str())
        .collect::<HashSet<_>>()
        .len()
}

pub fn run_inspect(config: &Config, path: &Path, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let report = inspect_document(&bytes, config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("file:        {}", path.display());
    println!("bytes:       {}", report.bytes);
    println!("sha256:      {}", report.content_hash);
    println!("document id: {}", report.document_id);
    println!("characters:  {}", report.chars);
    println!(
        "chunks:      {} (size {}, overlap {})",
        report.chunks, config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    if report.distinct_chunks < report.chunks {
        println!(
            "distinct:    {} ({} repeated)",
            report.distinct_chunks,
            report.chunks - report.distinct_chunks
        );
    }
    println!(
        "chunk chars: min {}, max {}",
        report.min_chunk_chars, report.max_chunk_chars
    );
    if let Some(first) = &report.first_chunk {
        println!("\nfirst chunk:\n{}", first);
    }
    Ok(())
}
