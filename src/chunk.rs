//! Fixed-size text chunker with overlap.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters. Consecutive chunks share `chunk_overlap` characters so a
//! sentence cut at a window edge still appears whole in one of them.
//! Window ends snap back to the nearest whitespace in the second half of
//! the window, so words are only cut when a window has no whitespace.
//!
//! Sizes are measured in `char`s, never bytes, so multi-byte text is
//! split on valid UTF-8 boundaries. Output is fully deterministic: chunk
//! IDs derive from the document ID and index, plus a SHA-256 hash of the
//! chunk text.

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Split text into overlapping fixed-size chunks.
/// Returns chunks with contiguous indices starting at 0; whitespace-only
/// text yields no chunks.
pub fn chunk_text(document_id: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    // Byte offset of every char, plus the end of the string.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = offsets.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total_chars {
        let mut end = (start + chunk_size).min(total_chars);

        if end < total_chars {
            // Snap back to whitespace, but never below half a window
            let floor = start + chunk_size / 2;
            if let Some(ws) = (floor..end)
                .rev()
                .find(|&i| text[offsets[i]..offsets[i + 1]].starts_with(char::is_whitespace))
            {
                end = ws + 1;
            }
        }

        let piece = text[offsets[start]..offsets[end]].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(document_id, chunks.len(), piece));
        }

        if end >= total_chars {
            break;
        }

        // Always make progress, even when overlap covers the whole window
        let next = end.saturating_sub(overlap).max(start + 1);
        // Begin the overlap on a word boundary when there is one
        start = (next..end)
            .find(|&i| text[offsets[i]..offsets[i + 1]].starts_with(char::is_whitespace))
            .map(|ws| ws + 1)
            .filter(|&s| s < end)
            .unwrap_or(next);
    }

    chunks
}

fn make_chunk(document_id: &str, index: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: format!("{}-{}", document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
