//! Embedding vectors and similarity
//!
//! Vectors come from a remote embedding model (see `llm::EmbeddingBackend`);
//! this module only compares and caches them.

use std::collections::HashMap;

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Vector returned for a query that could not be embedded.
pub fn zero_embedding(dimensions: usize) -> Embedding {
    vec![0.0; dimensions]
}

/// Calculate cosine similarity between two embeddings.
///
/// Mismatched lengths and zero vectors score 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Indices and scores of the `top_k` candidates most similar to `query`.
///
/// Ties keep candidate order.
pub fn find_similar(query: &[f32], candidates: &[&[f32]], top_k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, emb)| (i, cosine_similarity(query, emb)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Embeddings keyed by a text prefix.
///
/// Two texts sharing the first `key_chars` characters share an entry.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    key_chars: usize,
    entries: HashMap<String, Embedding>,
}

impl EmbeddingCache {
    pub fn new(key_chars: usize) -> Self {
        Self { key_chars, entries: HashMap::new() }
    }

    pub fn key_for(&self, text: &str) -> String {
        text.chars().take(self.key_chars).collect()
    }

    pub fn get(&self, text: &str) -> Option<&Embedding> {
        self.entries.get(&self.key_for(text))
    }

    pub fn insert(&mut self, text: &str, embedding: Embedding) {
        let key = self.key_for(text);
        self.entries.insert(key, embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
