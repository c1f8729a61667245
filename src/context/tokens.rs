//! Tokenizer adapter using tiktoken-rs, with a character-window fallback.
//!
//! Providers are tried in order: the encoding registered for the completion
//! model, then `cl100k_base`, then plain characters. The first one that loads is
//! cached per model name for the life of the process.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{cl100k_base, get_bpe_from_model, CoreBPE};
use tracing::{debug, warn};

/// Token identifier as produced by tiktoken-rs
pub type TokenId = usize;

/// Approximate characters per token, used when no BPE tokenizer is available
pub const CHARS_PER_TOKEN: usize = 4;

/// Longest run of tokens that may be needed to complete one UTF-8 character
const MAX_PARTIAL_TOKENS: usize = 4;

/// Tokenizers resolved so far, keyed by model name
static TOKENIZERS: RwLock<Option<HashMap<String, Arc<dyn Tokenizer>>>> = RwLock::new(None);

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Tokenizer unavailable for {model}: {message}")]
    Unavailable { model: String, message: String },
    #[error("Token sequence is not valid text: {0}")]
    Decode(String),
}

impl serde::Serialize for TokenizerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// What a token stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerKind {
    /// Byte-pair encoding compatible with the model's accounting
    Bpe,
    /// One token per character (degraded mode)
    Characters,
}

/// Text <-> token sequence conversion.
pub trait Tokenizer: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> TokenizerKind;
    fn encode(&self, text: &str) -> Vec<TokenId>;
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError>;
}

/// tiktoken-backed tokenizer
pub struct BpeTokenizer {
    name: String,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Encoding registered for a model name (e.g. `gpt-4o-mini`).
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let bpe = get_bpe_from_model(model).map_err(|e| TokenizerError::Unavailable {
            model: model.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { name: model.to_string(), bpe })
    }

    pub fn cl100k() -> Result<Self, TokenizerError> {
        let bpe = cl100k_base().map_err(|e| TokenizerError::Unavailable {
            model: "cl100k_base".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { name: "cl100k_base".to_string(), bpe })
    }

    /// Decode a window whose edges may split a multi-byte character.
    ///
    /// Tokens are accumulated until they form valid text. A run that grows past
    /// `MAX_PARTIAL_TOKENS` without decoding loses its leading token, and
    /// whatever is still pending at the end is flushed the same way, so only
    /// the bytes of a character cut at the window edge are dropped.
    fn decode_lossy(&self, tokens: &[TokenId]) -> String {
        let mut out = String::new();
        let mut pending: Vec<TokenId> = Vec::new();

        for &token in tokens {
            pending.push(token);
            if self.flush(&mut pending, &mut out) {
                continue;
            }
            if pending.len() >= MAX_PARTIAL_TOKENS {
                pending.remove(0);
                self.flush(&mut pending, &mut out);
            }
        }

        while !pending.is_empty() && !self.flush(&mut pending, &mut out) {
            pending.remove(0);
        }
        out
    }

    /// Append `pending` to `out` if it decodes, clearing it.
    fn flush(&self, pending: &mut Vec<TokenId>, out: &mut String) -> bool {
        match self.bpe.decode(pending.clone()) {
            Ok(text) => {
                out.push_str(&text);
                pending.clear();
                true
            }
            Err(_) => false,
        }
    }
}

impl Tokenizer for BpeTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::Bpe
    }

    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        match self.bpe.decode(tokens.to_vec()) {
            Ok(text) => Ok(text),
            Err(e) => {
                debug!(tokenizer = %self.name, error = %e, "Window splits a character; decoding lossily");
                Ok(self.decode_lossy(tokens))
            }
        }
    }
}

/// Degraded tokenizer: every character is one token.
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn name(&self) -> &str {
        "characters"
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::Characters
    }

    fn encode(&self, text: &str) -> Vec<TokenId> {
        text.chars().map(|c| c as TokenId).collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        tokens
            .iter()
            .map(|&t| {
                u32::try_from(t)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| TokenizerError::Decode(format!("{} is not a character", t)))
            })
            .collect()
    }
}

/// Resolve the first available tokenizer for a model.
fn resolve_tokenizer(model: &str) -> Arc<dyn Tokenizer> {
    match BpeTokenizer::for_model(model) {
        Ok(t) => return Arc::new(t),
        Err(e) => debug!(model, error = %e, "No model-specific encoding; trying cl100k_base"),
    }
    match BpeTokenizer::cl100k() {
        Ok(t) => Arc::new(t),
        Err(e) => {
            warn!(model, error = %e, "BPE tokenizer unavailable; falling back to character windows");
            Arc::new(CharTokenizer)
        }
    }
}

/// Tokenizer for a model, resolved once and cached.
pub fn tokenizer_for(model: &str) -> Arc<dyn Tokenizer> {
    {
        let cache = TOKENIZERS.read();
        if let Some(found) = cache.as_ref().and_then(|c| c.get(model)) {
            return Arc::clone(found);
        }
    }

    let tokenizer = resolve_tokenizer(model);
    let mut cache = TOKENIZERS.write();
    let entries = cache.get_or_insert_with(HashMap::new);
    Arc::clone(entries.entry(model.to_string()).or_insert(tokenizer))
}

/// Count tokens the way the model would (approximately).
pub fn count_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let tokenizer = tokenizer_for(model);
    match tokenizer.kind() {
        TokenizerKind::Bpe => tokenizer.encode(text).len() as u32,
        TokenizerKind::Characters => estimate_tokens_quick(text),
    }
}

/// Quick estimate: ~4 chars per token on average
pub fn estimate_tokens_quick(text: &str) -> u32 {
    (text.chars().count() as f64 / CHARS_PER_TOKEN as f64).ceil() as u32
}
