// Bookmind Library
// Exports core modules for use by the CLI binary and embedding applications

pub mod chat;
pub mod config;
pub mod context;
pub mod documents;
pub mod llm;
pub mod miro;
pub mod progress;
pub mod session;
pub mod summary;

#[cfg(test)]
mod testing;

// Re-export commonly used types for CLI
pub use config::{config_file_path, Config, ConfigError, CONFIG_PATH_ENV, MAX_EMBEDDING_BATCH};

pub use context::budget::{AssembledContext, ContextBudget, DEFAULT_CONTEXT_CHARS, EXCERPT_SEPARATOR};
pub use context::tokens::{
    count_tokens, estimate_tokens_quick, tokenizer_for, Tokenizer, TokenizerError, TokenizerKind,
};

pub use documents::{
    chunk_text, combine_chunks, cosine_similarity, extract_document, Chunk, ChunkerError,
    DocumentExtractor, EmbeddingCache, EmbeddingIndex, ExtractError, ExtractedDocument, IndexReport,
    SearchResult, NO_CONTENT_SENTINEL,
};

pub use llm::{CompletionBackend, CompletionRequest, EmbeddingBackend, LlmError, Message, OpenAiClient, Role};

pub use summary::{
    generate_workbook, layout, parse_structure, FinalSummary, MindMap, NodePlacement, SummaryError,
    Summarizer, Theme, Workbook,
};

pub use miro::{render_mind_map, BoardApi, MiroClient, MiroError, RenderedBoard};

pub use chat::{Answer, ChatEngine, ChatMessage, ChatRole};
pub use progress::{Progress, Stage};
pub use session::{Document, Session, SessionError, SessionInfo};
