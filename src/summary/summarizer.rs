//! Hierarchical Summarizer
//!
//! Map-reduce over chunks: each chunk gets an extraction pass, then the joined
//! extractions are organized into one heading/bullet summary. Calls are issued
//! sequentially and any failure aborts the run.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::mindmap::{parse_structure, MindMap};
use crate::config::SummaryConfig;
use crate::documents::chunker::{Chunk, NO_CONTENT_SENTINEL};
use crate::llm::{CompletionBackend, CompletionRequest, LlmError, Message};
use crate::progress::{Progress, Stage};

pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant that summarizes nonfiction books in a format ideal for creating mind maps.";

/// Separator between per-chunk extractions in the reduce input
pub const EXTRACTION_SEPARATOR: &str = "\n\n";

const MAP_PROMPT: &str = "\
Pull the essential material out of this section of a non-fiction book:
1. Core concepts and ideas
2. Main arguments and the evidence behind them
3. Notable facts, figures, and examples
4. Practical insights and takeaways

Be thorough but compact. Your notes feed a later pass that writes the final summary, so do not format them as a finished summary.

# Section
";

const REDUCE_PROMPT: &str = "\
Write a summary of this non-fiction book organized for a mind map.

Reason from first principles about what the book fundamentally teaches instead of retelling it chapter by chapter:
1. Name the central idea of the book
2. Identify 5-8 major themes that branch from it
3. Give each theme 3-5 key points, insights, or actions
4. Use concrete examples, facts, or quotes where they help

Use exactly this layout:

# [Book title or central idea]

## [Theme]
- [Key point]
- [Key point]
- [Key point]

Repeat the `##` block for every theme. Keep the language short and actionable and keep the relationships between ideas clear.

# Material
";

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("{stage:?} pass failed: {source}")]
    Completion {
        stage: Stage,
        /// Chunk being processed when the map pass failed
        chunk: Option<u32>,
        #[source]
        source: LlmError,
    },
}

impl Serialize for SummaryError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl SummaryError {
    pub fn llm_error(&self) -> &LlmError {
        match self {
            SummaryError::Completion { source, .. } => source,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.llm_error().user_message()
    }
}

/// Output of the reduce pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSummary {
    pub text: String,
    pub source_chunks: usize,
    pub completion_calls: usize,
}

impl FinalSummary {
    /// Whether the document had nothing to summarize
    pub fn is_empty_document(&self) -> bool {
        self.completion_calls == 0 && self.text == NO_CONTENT_SENTINEL
    }

    pub fn structure(&self) -> MindMap {
        parse_structure(&self.text)
    }
}

pub struct Summarizer<'a> {
    backend: &'a dyn CompletionBackend,
    config: &'a SummaryConfig,
}

impl<'a> Summarizer<'a> {
    pub fn new(backend: &'a dyn CompletionBackend, config: &'a SummaryConfig) -> Self {
        Self { backend, config }
    }

    /// Summarize a chunk list.
    ///
    /// A single chunk skips the map pass. A sentinel-only list makes no calls.
    pub fn summarize(
        &self,
        chunks: &[Chunk],
        progress: &mut dyn FnMut(Progress),
    ) -> Result<FinalSummary, SummaryError> {
        let content: Vec<&Chunk> = chunks.iter().filter(|c| !c.is_sentinel()).collect();

        match content.as_slice() {
            [] => {
                debug!("Nothing to summarize");
                Ok(FinalSummary {
                    text: NO_CONTENT_SENTINEL.to_string(),
                    source_chunks: 0,
                    completion_calls: 0,
                })
            }
            [only] => {
                info!("Single chunk; running reduce pass directly");
                let text = self.reduce(&only.content)?;
                progress(Progress::new(Stage::Reduce, 1, 1));
                Ok(FinalSummary { text, source_chunks: 1, completion_calls: 1 })
            }
            many => {
                let total = many.len();
                let mut extractions = Vec::with_capacity(total);
                for (i, chunk) in many.iter().enumerate() {
                    extractions.push(self.map(chunk)?);
                    progress(Progress::new(Stage::Map, i + 1, total));
                }

                let combined = extractions.join(EXTRACTION_SEPARATOR);
                info!(chunks = total, chars = combined.chars().count(), "Map pass complete; reducing");
                let text = self.reduce(&combined)?;
                progress(Progress::new(Stage::Reduce, 1, 1));

                Ok(FinalSummary { text, source_chunks: total, completion_calls: total + 1 })
            }
        }
    }

    fn map(&self, chunk: &Chunk) -> Result<String, SummaryError> {
        debug!(chunk = chunk.index, chars = chunk.content.len(), "Map pass");
        self.complete(MAP_PROMPT, &chunk.content, self.config.map_temperature)
            .map_err(|source| {
                warn!(chunk = chunk.index, error = %source, "Chunk extraction failed");
                SummaryError::Completion { stage: Stage::Map, chunk: Some(chunk.index), source }
            })
    }

    fn reduce(&self, material: &str) -> Result<String, SummaryError> {
        self.complete(REDUCE_PROMPT, material, self.config.reduce_temperature)
            .map_err(|source| {
                warn!(error = %source, "Reduce pass failed");
                SummaryError::Completion { stage: Stage::Reduce, chunk: None, source }
            })
    }

    fn complete(&self, prompt: &str, body: &str, temperature: f32) -> Result<String, LlmError> {
        let request = CompletionRequest::new(
            vec![Message::system(SYSTEM_PROMPT), Message::user(format!("{}{}", prompt, body))],
            temperature,
        );
        self.backend.complete(&request)
    }
}
