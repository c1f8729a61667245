//! Test doubles shared by unit tests.

use parking_lot::RwLock;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::context::tokens::{TokenId, Tokenizer, TokenizerError, TokenizerKind};
use crate::documents::embeddings::Embedding;
use crate::llm::{CompletionBackend, CompletionRequest, EmbeddingBackend, LlmError};

/// Process-wide word vocabulary so ids stay stable across tests
static VOCAB: RwLock<Option<(HashMap<String, TokenId>, Vec<String>)>> = RwLock::new(None);

/// One token per whitespace-separated word; decoding joins words with a space.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    fn kind(&self) -> TokenizerKind {
        TokenizerKind::Bpe
    }

    fn encode(&self, text: &str) -> Vec<TokenId> {
        let mut vocab = VOCAB.write();
        let (ids, words) = vocab.get_or_insert_with(|| (HashMap::new(), Vec::new()));
        text.split_whitespace()
            .map(|w| {
                *ids.entry(w.to_string()).or_insert_with(|| {
                    words.push(w.to_string());
                    words.len() - 1
                })
            })
            .collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        let vocab = VOCAB.read();
        let words = vocab.as_ref().map(|(_, w)| w.as_slice()).unwrap_or(&[]);
        tokens
            .iter()
            .map(|&t| {
                words
                    .get(t)
                    .map(String::as_str)
                    .ok_or_else(|| TokenizerError::Decode(format!("unknown token {}", t)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|w| w.join(" "))
    }
}

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError>>;

/// Completion backend driven by a closure; records every request.
pub struct FakeCompletion {
    responder: Responder,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + 'static,
    {
        Self { responder: Box::new(responder), requests: RefCell::new(Vec::new()) }
    }

    /// Always answers with the same text.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fails with `error`.
    pub fn failing(error: LlmError) -> Self {
        Self::new(move |_| Err(error.clone()))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl CompletionBackend for FakeCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.borrow_mut().push(request.clone());
        (self.responder)(request)
    }
}

/// Embeds text as a bag of topic indicators: dimension `i` is 1.0 when the
/// lowercased text mentions topic `i`.
pub struct FakeEmbedder {
    topics: Vec<String>,
    overrides: RefCell<HashMap<String, Embedding>>,
    calls: Cell<usize>,
    fail_on: Cell<Option<usize>>,
}

impl FakeEmbedder {
    pub fn topics(topics: &[&str]) -> Self {
        Self {
            topics: topics.iter().map(|t| t.to_lowercase()).collect(),
            overrides: RefCell::new(HashMap::new()),
            calls: Cell::new(0),
            fail_on: Cell::new(None),
        }
    }

    pub fn set_override(&self, text: &str, embedding: Embedding) {
        self.overrides.borrow_mut().insert(text.to_string(), embedding);
    }

    /// Make the `n`th call (1-based) fail.
    pub fn fail_on_call(&self, n: usize) {
        self.fail_on.set(Some(n));
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn vector(&self, text: &str) -> Embedding {
        if let Some(v) = self.overrides.borrow().get(text) {
            return v.clone();
        }
        let lower = text.to_lowercase();
        self.topics
            .iter()
            .map(|t| if lower.contains(t.as_str()) { 1.0 } else { 0.0 })
            .collect()
    }
}

impl EmbeddingBackend for FakeEmbedder {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Embedding>, LlmError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_on.get() == Some(call) {
            return Err(LlmError::Upstream { status: 500, message: "scripted failure".to_string() });
        }
        Ok(inputs.iter().map(|t| self.vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.topics.len()
    }
}
