//! Document Chunking
//!
//! Splits a document into overlapping token windows. Windows widen for very
//! large books, and the final count is capped by merging consecutive chunks.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ChunkingConfig;
use crate::context::tokens::{TokenId, Tokenizer, TokenizerError, TokenizerKind, CHARS_PER_TOKEN};

/// Text of the placeholder chunk produced for an empty document
pub const NO_CONTENT_SENTINEL: &str = "No text content found in document.";

/// Character thresholds for adaptive window sizing
pub const LARGE_DOCUMENT_CHARS: usize = 200_000;
pub const VERY_LARGE_DOCUMENT_CHARS: usize = 500_000;

/// Window used above `LARGE_DOCUMENT_CHARS`
pub const LARGE_WINDOW: WindowPlan = WindowPlan { max_tokens: 4_000, overlap: 150 };
/// Window used above `VERY_LARGE_DOCUMENT_CHARS`
pub const VERY_LARGE_WINDOW: WindowPlan = WindowPlan { max_tokens: 8_000, overlap: 200 };

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Invalid window: overlap {overlap} must be smaller than window {max_tokens}")]
    InvalidWindow { max_tokens: usize, overlap: usize },
    #[error("Chunk cap must be at least 1")]
    InvalidCap,
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
}

impl Serialize for ChunkerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A contiguous span of the document, decoded back to text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Position in document order
    pub index: u32,
    pub content: String,
    /// Source token span (characters when running without a BPE tokenizer)
    pub token_start: usize,
    pub token_end: usize,
    /// Set only on the "no content" placeholder
    #[serde(default)]
    pub sentinel: bool,
}

impl Chunk {
    pub fn sentinel() -> Self {
        Self {
            index: 0,
            content: NO_CONTENT_SENTINEL.to_string(),
            token_start: 0,
            token_end: 0,
            sentinel: true,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    pub fn token_count(&self) -> usize {
        self.token_end - self.token_start
    }

    pub fn span(&self) -> Range<usize> {
        self.token_start..self.token_end
    }
}

/// Window size and overlap actually used for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPlan {
    pub max_tokens: usize,
    pub overlap: usize,
}

impl WindowPlan {
    pub fn stride(&self) -> usize {
        self.max_tokens - self.overlap
    }

    /// Same plan measured in characters, for the degraded tokenizer.
    fn in_characters(self) -> Self {
        Self {
            max_tokens: self.max_tokens * CHARS_PER_TOKEN,
            overlap: self.overlap * CHARS_PER_TOKEN,
        }
    }
}

/// Pick the window for a document of `char_count` characters.
pub fn plan_window(char_count: usize, config: &ChunkingConfig) -> WindowPlan {
    let base = WindowPlan { max_tokens: config.max_tokens, overlap: config.overlap };
    if !config.adaptive {
        return base;
    }
    let widened = if char_count > VERY_LARGE_DOCUMENT_CHARS {
        VERY_LARGE_WINDOW
    } else if char_count > LARGE_DOCUMENT_CHARS {
        LARGE_WINDOW
    } else {
        return base;
    };
    // Never shrink a window that is already configured larger
    if widened.max_tokens > base.max_tokens {
        widened
    } else {
        base
    }
}

/// Token ranges of successive windows.
///
/// Each window starts `max_tokens - overlap` after the previous one; windows
/// are produced while the start is still inside the sequence.
pub fn sliding_windows(len: usize, plan: WindowPlan) -> Result<Vec<Range<usize>>, ChunkerError> {
    if plan.max_tokens == 0 || plan.overlap >= plan.max_tokens {
        return Err(ChunkerError::InvalidWindow {
            max_tokens: plan.max_tokens,
            overlap: plan.overlap,
        });
    }
    let stride = plan.stride();
    Ok((0..len)
        .step_by(stride)
        .map(|start| start..(start + plan.max_tokens).min(len))
        .collect())
}

/// Split `text` into chunks.
///
/// An empty or whitespace-only document yields exactly one sentinel chunk.
pub fn chunk_text(
    text: &str,
    tokenizer: &dyn Tokenizer,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, ChunkerError> {
    if text.trim().is_empty() {
        debug!("Document has no content; returning sentinel chunk");
        return Ok(vec![Chunk::sentinel()]);
    }

    let char_count = text.chars().count();
    let mut plan = plan_window(char_count, config);
    if tokenizer.kind() == TokenizerKind::Characters {
        plan = plan.in_characters();
    }

    let tokens: Vec<TokenId> = tokenizer.encode(text);
    if tokens.is_empty() {
        return Ok(vec![Chunk::sentinel()]);
    }

    let windows = sliding_windows(tokens.len(), plan)?;
    let mut chunks = Vec::with_capacity(windows.len());
    for (i, window) in windows.into_iter().enumerate() {
        let content = tokenizer.decode(&tokens[window.clone()])?;
        chunks.push(Chunk {
            index: i as u32,
            content,
            token_start: window.start,
            token_end: window.end,
            sentinel: false,
        });
    }

    info!(
        tokenizer = tokenizer.name(),
        chars = char_count,
        tokens = tokens.len(),
        window = plan.max_tokens,
        overlap = plan.overlap,
        chunks = chunks.len(),
        "Chunked document"
    );

    match config.max_chunks {
        Some(max) => combine_chunks(chunks, max),
        None => Ok(chunks),
    }
}

/// Merge consecutive chunks so that at most `max_chunks` remain.
///
/// Groups of `ceil(n / max_chunks)` neighbours are joined with a space. This is
/// lossy on granularity but bounds the number of downstream model calls.
pub fn combine_chunks(chunks: Vec<Chunk>, max_chunks: usize) -> Result<Vec<Chunk>, ChunkerError> {
    if max_chunks == 0 {
        return Err(ChunkerError::InvalidCap);
    }
    if chunks.len() <= max_chunks {
        return Ok(chunks);
    }

    let original = chunks.len();
    let group_size = original.div_ceil(max_chunks);
    let combined: Vec<Chunk> = chunks
        .chunks(group_size)
        .enumerate()
        .filter_map(|(i, group)| {
            let first = group.first()?;
            let last = group.last()?;
            Some(Chunk {
                index: i as u32,
                content: group.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join(" "),
                token_start: first.token_start,
                token_end: last.token_end,
                sentinel: false,
            })
        })
        .collect();

    info!(
        from = original,
        to = combined.len(),
        group_size,
        cap = max_chunks,
        "Combined chunks to respect cap"
    );
    Ok(combined)
}
