//! # Text Chunking
//!
//! Splits document text into chunks for embedding. Paragraphs are packed together
//! until a chunk reaches `CHUNK_SIZE_LIMIT`; a single paragraph longer than the limit
//! is cut by character count with an overlap.

use super::IngestError;
use tracing::warn;

/// The target maximum size for a single text chunk in characters.
pub const CHUNK_SIZE_LIMIT: usize = 1500;

/// The character overlap between consecutive pieces of an oversized paragraph.
pub const CHUNK_OVERLAP: usize = 150;

/// Chunks `text` on paragraph boundaries (`\n\n`).
pub fn chunk_text(text: &str) -> Result<Vec<String>, IngestError> {
    let trimmed_text = text.trim();
    if trimmed_text.is_empty() {
        return Err(IngestError::EmptyContent);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in trimmed_text.split("\n\n") {
        let p_trimmed = paragraph.trim();
        if p_trimmed.is_empty() {
            continue;
        }
        let p_len = p_trimmed.chars().count();

        if p_len > CHUNK_SIZE_LIMIT {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            warn!(
                "Paragraph exceeds chunk size limit ({} > {}). Splitting by character.",
                p_len, CHUNK_SIZE_LIMIT
            );
            chunks.extend(split_long_text(p_trimmed));
            continue;
        }

        let current_len = current.chars().count();
        if !current.is_empty() && current_len + 2 + p_len > CHUNK_SIZE_LIMIT {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(p_trimmed);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Splits a long string into pieces of at most `CHUNK_SIZE_LIMIT` characters,
/// overlapping by `CHUNK_OVERLAP` characters.
fn split_long_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0;

    while start < chars.len() {
        let end = std::cmp::min(start + CHUNK_SIZE_LIMIT, chars.len());
        chunks.push(chars[start..end].iter().collect());

        let next_start = start + CHUNK_SIZE_LIMIT - CHUNK_OVERLAP;
        if next_start >= chars.len() || end == chars.len() {
            break;
        }
        start = next_start;
    }

    chunks
}
