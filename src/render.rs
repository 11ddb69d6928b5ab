//! Plain-text rendering of answers and their sources.

use crate::models::{ConversationTurn, RetrievedChunk};

/// Characters of a source chunk shown before it is cut off.
pub const SOURCE_PREVIEW_CHARS: usize = 300;

/// First [`SOURCE_PREVIEW_CHARS`] characters of `text`, with `...` when cut.
pub fn source_preview(text: &str) -> String {
    match text.char_indices().nth(SOURCE_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Citation label for the source at zero-based position `i`.
pub fn source_label(i: usize) -> String {
    format!("Source {}", i + 1)
}

/// Sources numbered by their position in the answer, not their chunk index.
pub fn format_sources(sources: &[RetrievedChunk]) -> String {
    let mut out = String::new();
    if sources.is_empty() {
        return out;
    }
    out.push_str(&format!("{} source(s):\n", sources.len()));
    for (i, source) in sources.iter().enumerate() {
        out.push_str(&format!(
            "\n{}: (score {:.2})\n{}\n",
            source_label(i),
            source.score,
            source_preview(&source.text)
        ));
    }
    out
}

pub fn format_turn(turn: &ConversationTurn) -> String {
    let mut out = format!("You: {}\n\nAssistant: {}\n", turn.query, turn.response);
    let sources = format_sources(&turn.sources);
    if !sources.is_empty() {
        out.push('\n');
        out.push_str(&sources);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(index: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("doc-{}", index),
            chunk_index: index,
            text: text.to_string(),
            score: 0.75,
        }
    }

    #[test]
    fn test_preview_short_text_unchanged() {
        assert_eq!(source_preview("short"), "short");
        let exact = "a".repeat(SOURCE_PREVIEW_CHARS);
        assert_eq!(source_preview(&exact), exact);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "é".repeat(400);
        let preview = source_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), SOURCE_PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_sources_numbered_by_position() {
        let out = format_sources(&[retrieved(7, "seventh chunk"), retrieved(2, "second chunk")]);
        assert!(out.contains("Source 1: (score 0.75)\nseventh chunk"));
        assert!(out.contains("Source 2: (score 0.75)\nsecond chunk"));
        assert!(!out.contains("Source 8"));
    }

    #[test]
    fn test_no_sources_renders_nothing() {
        assert!(format_sources(&[]).is_empty());
    }
}
