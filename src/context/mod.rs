//! Context Management Module
//!
//! Token accounting for chunk sizing and the character budget applied to
//! retrieved excerpts before they reach a prompt.

pub mod budget;
pub mod tokens;

pub use budget::{AssembledContext, ContextBudget, DEFAULT_CONTEXT_CHARS, EXCERPT_SEPARATOR, MIN_PARTIAL_CHARS};
pub use tokens::{
    count_tokens, estimate_tokens_quick, tokenizer_for, BpeTokenizer, CharTokenizer, TokenId,
    Tokenizer, TokenizerError, TokenizerKind, CHARS_PER_TOKEN,
};
