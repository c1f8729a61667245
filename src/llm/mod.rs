//! Language model access (completions and embeddings)

pub mod client;

pub use client::{
    classify_failure, CompletionBackend, CompletionRequest, EmbeddingBackend, LlmError, Message,
    OpenAiClient, Role,
};
