//! PDF text extraction.
//!
//! Uploads arrive as raw bytes; this module turns them into plain UTF-8
//! text for the chunker. Nothing here panics on malformed input: every
//! failure comes back as an [`ExtractError`].

use std::path::Path;

use thiserror::Error;

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("not a PDF file")]
    NotPdf,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("PDF contains no extractable text")]
    NoText,
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Extracts text from an in-memory PDF.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    if !looks_like_pdf(bytes) {
        return Err(ExtractError::NotPdf);
    }

    // pdf-extract can panic on malformed fonts and streams.
    let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::Pdf("parser panicked on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(text)
}

/// Extracts text from a PDF on disk.
pub fn extract_pdf_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_pdf(&bytes)
}

/// Cheap header sniff; tolerates leading whitespace some generators emit.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}
