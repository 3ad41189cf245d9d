
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KbError, Result};

/// Separator priority list, coarse to fine: paragraph break, line break,
/// sentence-ending punctuation (ASCII and CJK), whitespace. The empty string
/// is the character-by-character fallback and must stay last.
const SEPARATORS: &[&str] = &[
    "\n\n", "\n", ". ", "! ", "? ", "。", "！", "？", "；", " ", "",
];

pub const MIN_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 5000;
pub const MAX_CHUNK_OVERLAP: usize = 1000;

/// Chunking parameters shared by ingestion and reindexing.
///
/// Sizes are measured in characters, not bytes, so multi-byte text chunks the
/// same way regardless of encoding width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkParams {
    #[inline]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let params = Self {
            chunk_size,
            chunk_overlap,
        };
        params.validate()?;
        Ok(params)
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(KbError::Validation(format!(
                "chunk_size {} out of range ({}-{})",
                self.chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
            )));
        }
        if self.chunk_overlap > MAX_CHUNK_OVERLAP {
            return Err(KbError::Validation(format!(
                "chunk_overlap {} out of range (0-{})",
                self.chunk_overlap, MAX_CHUNK_OVERLAP
            )));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(KbError::Validation(format!(
                "chunk_overlap {} must be less than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split raw text into bounded, overlapping chunks using recursive separator
/// splitting.
///
/// Separators stay attached to the preceding segment, so concatenating the
/// output with overlaps removed reproduces the input exactly. Each emitted
/// chunk carries the trailing `chunk_overlap` characters of its predecessor:
/// whole trailing segments when they fit (the separator snap), otherwise a
/// hard character cut.
#[inline]
pub fn split_text(text: &str, params: &ChunkParams) -> Result<Vec<String>> {
    params.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let segments = split_recursive(text, params.chunk_size, SEPARATORS);
    let chunks = merge_segments(segments, params.chunk_size, params.chunk_overlap);

    debug!(
        "Split {} chars into {} chunks (chunk_size={}, overlap={})",
        text.chars().count(),
        chunks.len(),
        params.chunk_size,
        params.chunk_overlap
    );

    Ok(chunks)
}

/// Split on the highest-priority separator present, recursing into any piece
/// that still exceeds `chunk_size` with the remaining separators. The empty
/// separator splits per character and guarantees termination.
fn split_recursive(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if text.chars().count() <= chunk_size {
        return vec![text.to_string()];
    }

    let sep_pos = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len() - 1);
    let separator = separators[sep_pos];

    let mut segments = Vec::new();
    for piece in split_keeping_separator(text, separator) {
        if piece.chars().count() <= chunk_size {
            segments.push(piece);
        } else if sep_pos + 1 < separators.len() {
            segments.extend(split_recursive(&piece, chunk_size, &separators[sep_pos + 1..]));
        } else {
            // Unreachable with the character fallback in place, but an
            // oversized atomic piece is passed through rather than dropped.
            segments.push(piece);
        }
    }
    segments
}

/// Split `text` on `separator`, keeping the separator attached to the end of
/// the preceding piece so that the pieces concatenate back to `text`.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(separator) {
        let end = pos + separator.len();
        pieces.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Greedily assemble segments into chunks of at most `chunk_size` characters,
/// carrying `overlap` trailing characters across each chunk boundary.
fn merge_segments(segments: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut window: VecDeque<(String, usize)> = VecDeque::new();
    let mut total = 0usize;

    for segment in segments {
        let seg_len = segment.chars().count();

        if total + seg_len > chunk_size && total > 0 {
            chunks.push(join_window(&window));

            // Retain whole trailing segments up to the overlap budget, and
            // make room for the incoming segment.
            while total > overlap || (total + seg_len > chunk_size && total > 0) {
                match window.pop_front() {
                    Some((_, len)) => total -= len,
                    None => break,
                }
            }

            // No whole segment fits the overlap budget: hard character cut
            // from the chunk just emitted, as long as it keeps the next chunk
            // within bounds.
            if window.is_empty() && overlap > 0 && overlap + seg_len <= chunk_size {
                if let Some(previous) = chunks.last() {
                    if let Some(carry) = tail_chars(previous, overlap) {
                        total = overlap;
                        window.push_back((carry, overlap));
                    }
                }
            }
        }

        total += seg_len;
        window.push_back((segment, seg_len));
    }

    if !window.is_empty() {
        chunks.push(join_window(&window));
    }

    chunks
}

fn join_window(window: &VecDeque<(String, usize)>) -> String {
    window.iter().map(|(segment, _)| segment.as_str()).collect()
}

/// Last `count` characters of `text`, or `None` if `text` is not longer than
/// `count` (a full carry would duplicate the entire previous chunk).
fn tail_chars(text: &str, count: usize) -> Option<String> {
    let total = text.chars().count();
    if total <= count {
        return None;
    }
    Some(text.chars().skip(total - count).collect())
}
