//! Embedding Index
//!
//! Flat in-memory collection of chunk embeddings with brute-force cosine
//! search. An index belongs to one session and is not safe for concurrent
//! mutation; wrap it in external synchronization before sharing it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::chunker::Chunk;
use super::embeddings::{find_similar, zero_embedding, Embedding, EmbeddingCache};
use crate::config::{RetrievalConfig, MAX_EMBEDDING_BATCH};
use crate::llm::EmbeddingBackend;
use crate::progress::{Progress, Stage};

/// Search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub chunk_index: u32,
    pub content: String,
    pub score: f32,
}

/// One chunk's text paired with its vector
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Embedding,
}

/// Outcome of one initialization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    /// Chunks offered, excluding the sentinel
    pub available: usize,
    /// Chunks chosen after down-sampling
    pub selected: usize,
    pub indexed: usize,
    pub skipped_batches: usize,
}

pub struct EmbeddingIndex {
    records: Vec<EmbeddingRecord>,
    cache: EmbeddingCache,
    max_chunks: usize,
    batch_size: usize,
    initialized: bool,
}

impl EmbeddingIndex {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            records: Vec::new(),
            cache: EmbeddingCache::new(config.cache_key_chars),
            max_chunks: config.max_indexed_chunks.max(1),
            batch_size: config.batch_size.clamp(1, MAX_EMBEDDING_BATCH),
            initialized: false,
        }
    }

    /// Embed `chunks` and replace the index contents.
    ///
    /// Every selected chunk is embedded. The prefix cache is only written here;
    /// `search` reads it for queries. A batch whose embedding call fails is
    /// logged and skipped, and its chunks are simply absent from the index. The
    /// index is marked initialized once every batch has been attempted.
    pub fn initialize(
        &mut self,
        chunks: &[Chunk],
        backend: &dyn EmbeddingBackend,
        progress: &mut dyn FnMut(Progress),
    ) -> IndexReport {
        self.records.clear();
        self.initialized = false;

        let content: Vec<&Chunk> = chunks.iter().filter(|c| !c.is_sentinel()).collect();
        let selected = select_representative(&content, self.max_chunks);
        let mut report = IndexReport {
            available: content.len(),
            selected: selected.len(),
            ..IndexReport::default()
        };

        if selected.len() < content.len() {
            info!(from = content.len(), to = selected.len(), "Down-sampled chunks for indexing");
        }

        let batches: Vec<&[&Chunk]> = selected.chunks(self.batch_size).collect();
        let total = batches.len();

        for (batch_no, batch) in batches.into_iter().enumerate() {
            let inputs: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            match backend.embed(&inputs) {
                Ok(embedded) if embedded.len() == inputs.len() => {
                    for (chunk, embedding) in batch.iter().zip(embedded) {
                        self.cache.insert(&chunk.content, embedding.clone());
                        self.records.push(EmbeddingRecord {
                            chunk_index: chunk.index,
                            text: chunk.content.clone(),
                            embedding,
                        });
                    }
                }
                Ok(embedded) => {
                    warn!(
                        batch = batch_no + 1,
                        expected = inputs.len(),
                        received = embedded.len(),
                        "Embedding count mismatch; skipping batch"
                    );
                    report.skipped_batches += 1;
                }
                Err(e) => {
                    warn!(batch = batch_no + 1, error = %e, "Embedding batch failed; skipping");
                    report.skipped_batches += 1;
                }
            }
            progress(Progress::new(Stage::Embedding, batch_no + 1, total));
        }

        report.indexed = self.records.len();
        self.initialized = true;
        info!(
            indexed = report.indexed,
            selected = report.selected,
            skipped_batches = report.skipped_batches,
            "Embedding index ready"
        );
        report
    }

    /// Top `top_k` records by cosine similarity to `query`.
    ///
    /// A query that cannot be embedded is compared as a zero vector, so every
    /// record scores 0 and the first `top_k` in chunk order are returned.
    pub fn search(
        &mut self,
        query: &str,
        top_k: usize,
        backend: &dyn EmbeddingBackend,
    ) -> Vec<SearchResult> {
        if self.records.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_embedding = self.embed_query(query, backend);
        let candidates: Vec<&[f32]> = self.records.iter().map(|r| r.embedding.as_slice()).collect();
        let results: Vec<SearchResult> = find_similar(&query_embedding, &candidates, top_k)
            .into_iter()
            .map(|(i, score)| {
                let record = &self.records[i];
                SearchResult { chunk_index: record.chunk_index, content: record.text.clone(), score }
            })
            .collect();

        debug!(
            results = results.len(),
            best = results.first().map(|r| r.score).unwrap_or(0.0),
            "Index search"
        );
        results
    }

    fn embed_query(&mut self, query: &str, backend: &dyn EmbeddingBackend) -> Embedding {
        if let Some(hit) = self.cache.get(query) {
            debug!("Query embedding served from cache");
            return hit.clone();
        }
        match backend.embed(&[query]) {
            Ok(mut vectors) if vectors.len() == 1 => {
                let embedding = vectors.remove(0);
                self.cache.insert(query, embedding.clone());
                embedding
            }
            Ok(vectors) => {
                warn!(received = vectors.len(), "Unexpected query embedding count; using zero vector");
                zero_embedding(backend.dimensions())
            }
            Err(e) => {
                warn!(error = %e, "Query embedding failed; using zero vector");
                zero_embedding(backend.dimensions())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EmbeddingRecord] {
        &self.records
    }

    pub fn cached_embeddings(&self) -> usize {
        self.cache.len()
    }

    /// Drop records and cached vectors.
    pub fn clear(&mut self) {
        self.records.clear();
        self.cache.clear();
        self.initialized = false;
    }
}

/// Evenly spaced sample across the whole list, truncated to `cap`.
///
/// Stride is `floor(n / cap)`, so the sample may start with more than `cap`
/// items before truncation.
pub fn select_representative<T: Copy>(items: &[T], cap: usize) -> Vec<T> {
    if items.len() <= cap {
        return items.to_vec();
    }
    let step = (items.len() / cap).max(1);
    items.iter().step_by(step).take(cap).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEmbedder;

    fn chunk(index: u32, content: &str) -> Chunk {
        Chunk {
            index,
            content: content.to_string(),
            token_start: 0,
            token_end: 1,
            sentinel: false,
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig { batch_size: 2, ..RetrievalConfig::default() }
    }

    #[test]
    fn test_select_representative() {
        let items: Vec<usize> = (0..450).collect();
        let picked = select_representative(&items, 200);
        assert_eq!(picked.len(), 200);
        // stride 2 covers only the first 400 before truncation
        assert_eq!(picked[1], 2);
        assert_eq!(picked[199], 398);

        let items: Vec<usize> = (0..1000).collect();
        let picked = select_representative(&items, 200);
        assert_eq!(picked[199], 995);

        let small: Vec<usize> = (0..5).collect();
        assert_eq!(select_representative(&small, 200), small);
    }

    #[test]
    fn test_ranks_unrelated_chunk_last() {
        let embedder = FakeEmbedder::topics(&["climate", "economic", "cooking"]);
        let chunks = vec![
            chunk(0, "Climate policy requires coordinated emissions cuts"),
            chunk(1, "Economic growth depends on productivity and climate stability"),
            chunk(2, "Unrelated anecdote about cooking pasta"),
        ];
        let mut index = EmbeddingIndex::new(&config());
        let report = index.initialize(&chunks, &embedder, &mut crate::progress::ignore);
        assert_eq!(report.indexed, 3);

        embedder.set_override("What is the main argument?", vec![1.0, 0.3, 0.0]);
        let results = index.search("What is the main argument?", 3, &embedder);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[2].chunk_index, 2);
        assert!(results[0].score >= results[1].score && results[1].score >= results[2].score);
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let embedder = FakeEmbedder::topics(&["alpha", "beta"]);
        embedder.fail_on_call(2);
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(i, &format!("alpha text {}", i))).collect();

        let mut index = EmbeddingIndex::new(&config());
        let mut seen = Vec::new();
        let report = index.initialize(&chunks, &embedder, &mut |p| seen.push(p.completed));

        assert_eq!(report.skipped_batches, 1);
        assert_eq!(report.indexed, 3);
        assert_eq!(index.len(), 3);
        assert!(index.is_initialized());
        assert_eq!(seen, vec![1, 2, 3]);
        let kept: Vec<u32> = index.records().iter().map(|r| r.chunk_index).collect();
        assert_eq!(kept, vec![0, 1, 4]);
    }

    #[test]
    fn test_search_bounds() {
        let embedder = FakeEmbedder::topics(&["alpha", "beta"]);
        let chunks: Vec<Chunk> = (0..4).map(|i| chunk(i, &format!("beta {}", i))).collect();
        let mut index = EmbeddingIndex::new(&config());
        index.initialize(&chunks, &embedder, &mut crate::progress::ignore);

        for k in 0..6 {
            let results = index.search("beta", k, &embedder);
            assert!(results.len() <= k);
            for r in &results {
                assert!(chunks.iter().any(|c| c.index == r.chunk_index && c.content == r.content));
            }
        }
    }

    #[test]
    fn test_query_failure_uses_zero_vector() {
        let embedder = FakeEmbedder::topics(&["alpha"]);
        let chunks = vec![chunk(0, "alpha one"), chunk(1, "alpha two")];
        let mut index = EmbeddingIndex::new(&config());
        index.initialize(&chunks, &embedder, &mut crate::progress::ignore);

        embedder.fail_on_call(embedder.calls() + 1);
        let results = index.search("a question nobody asked", 2, &embedder);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_sentinel_not_indexed() {
        let embedder = FakeEmbedder::topics(&["alpha"]);
        let mut index = EmbeddingIndex::new(&config());
        let report = index.initialize(&[Chunk::sentinel()], &embedder, &mut crate::progress::ignore);
        assert_eq!(report.available, 0);
        assert_eq!(embedder.calls(), 0);
        assert!(index.is_empty());
        assert!(index.is_initialized());
    }

    #[test]
    fn test_reindex_embeds_again_and_fills_cache() {
        let embedder = FakeEmbedder::topics(&["alpha"]);
        let chunks = vec![chunk(0, "alpha one"), chunk(1, "alpha two")];
        let mut index = EmbeddingIndex::new(&config());
        index.initialize(&chunks, &embedder, &mut crate::progress::ignore);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(index.cached_embeddings(), 2);

        index.initialize(&chunks, &embedder, &mut crate::progress::ignore);
        assert_eq!(embedder.calls(), 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_shared_prefix_chunks_keep_their_own_vectors() {
        let embedder = FakeEmbedder::topics(&["climate", "cooking"]);
        let prefix = "h".repeat(100);
        let chunks = vec![
            chunk(0, &format!("{} climate policy", prefix)),
            chunk(1, &format!("{} cooking pasta", prefix)),
        ];
        let config = RetrievalConfig { batch_size: 1, ..RetrievalConfig::default() };
        let mut index = EmbeddingIndex::new(&config);
        index.initialize(&chunks, &embedder, &mut crate::progress::ignore);

        let vectors: Vec<Embedding> = index.records().iter().map(|r| r.embedding.clone()).collect();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(index.cached_embeddings(), 1);
    }
}
