//! Document Module
//!
//! Text extraction, chunking, embedding, and retrieval for one book.

pub mod chunker;
pub mod embeddings;
pub mod extract;
pub mod retriever;

// Re-export key public types
pub use chunker::{
    chunk_text, combine_chunks, plan_window, Chunk, ChunkerError, WindowPlan, NO_CONTENT_SENTINEL,
};
pub use embeddings::{cosine_similarity, find_similar, Embedding, EmbeddingCache};
pub use extract::{extract_document, DocumentExtractor, ExtractError, ExtractedDocument, TextExtractor};
pub use retriever::{EmbeddingIndex, EmbeddingRecord, IndexReport, SearchResult};
