//! Line-boundary text chunker.
//!
//! Splits document content into [`Chunk`]s that respect a configurable
//! `max_chunk_chars` limit. Splitting only ever happens between lines, so
//! a chunk's `start_line`/`end_line` attribution stays exact for later
//! source-location reporting. A single line longer than the limit becomes
//! its own oversized chunk rather than being split mid-line.
//!
//! Each chunk receives a v4 UUID plus a SHA-256 hash of its text for
//! embedding staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split content into line-bounded chunks. Returns chunks with contiguous
/// indices starting at 0. An empty document yields zero chunks.
pub fn chunk_document(document_id: &str, content: &str, max_chunk_chars: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_start_line: i64 = 0;
    let mut buf_end_line: i64 = 0;
    let mut chunk_index: i64 = 0;

    for (i, line) in content.lines().enumerate() {
        let line_no = (i + 1) as i64;

        let would_be = if buf.is_empty() {
            line.len()
        } else {
            buf.len() + 1 + line.len() // +1 for the newline separator
        };

        if would_be > max_chunk_chars && !buf.is_empty() {
            if let Some(chunk) = make_chunk(document_id, chunk_index, &buf, buf_start_line, buf_end_line) {
                chunks.push(chunk);
                chunk_index += 1;
            }
            buf.clear();
        }

        if buf.is_empty() {
            buf_start_line = line_no;
        } else {
            buf.push('\n');
        }
        buf.push_str(line);
        buf_end_line = line_no;
    }

    // Flush the last non-empty accumulator
    if !buf.is_empty() {
        if let Some(chunk) = make_chunk(document_id, chunk_index, &buf, buf_start_line, buf_end_line) {
            chunks.push(chunk);
        }
    }

    chunks
}

fn make_chunk(
    document_id: &str,
    index: i64,
    text: &str,
    start_line: i64,
    end_line: i64,
) -> Option<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(trimmed.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Some(Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: trimmed.to_string(),
        start_line,
        end_line,
        hash,
    })
}
