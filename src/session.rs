//! Session
//!
//! Owns one book and everything derived from it: chunks, summary, workbook,
//! mind map, embedding index, and chat history. Loading a new document clears
//! all of it; `reset` clears the derived state but keeps the document.
//!
//! A session is a plain single-owner value. It is not safe to share between
//! concurrent requests without external synchronization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use ulid::Ulid;

use crate::chat::{Answer, ChatEngine, ChatMessage, WELCOME_MESSAGE};
use crate::config::Config;
use crate::context::tokens::tokenizer_for;
use crate::documents::chunker::{chunk_text, Chunk, ChunkerError};
use crate::documents::extract::{DocumentExtractor, ExtractError};
use crate::documents::retriever::{EmbeddingIndex, IndexReport};
use crate::llm::{CompletionBackend, EmbeddingBackend, LlmError};
use crate::miro::{render_mind_map, BoardApi, MiroError, RenderedBoard};
use crate::progress::Progress;
use crate::summary::{generate_workbook, FinalSummary, MindMap, SummaryError, Summarizer, Workbook};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No document loaded")]
    NoDocument,
    #[error("No summary yet; summarize the document first")]
    NoSummary,
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),
    #[error("Summary error: {0}")]
    Summary(#[from] SummaryError),
    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),
    #[error("Miro error: {0}")]
    Miro(#[from] MiroError),
}

impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl SessionError {
    /// Remedy to show the reader when the failure came from the language model.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            SessionError::Llm(e) => Some(e.user_message()),
            SessionError::Summary(e) => Some(e.user_message()),
            _ => None,
        }
    }
}

/// Loaded book text
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub text: String,
}

/// Serializable overview of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub document_chars: usize,
    pub chunk_count: usize,
    pub has_summary: bool,
    pub has_workbook: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mind_map_url: Option<String>,
    pub indexed_chunks: usize,
    pub chat_turns: usize,
}

pub struct Session {
    id: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    config: Config,
    document: Option<Document>,
    chunks: Option<Vec<Chunk>>,
    summary: Option<FinalSummary>,
    workbook: Option<Workbook>,
    mind_map: Option<RenderedBoard>,
    index: EmbeddingIndex,
    chat_history: Vec<ChatMessage>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            created: now,
            updated: now,
            index: EmbeddingIndex::new(&config.retrieval),
            config,
            document: None,
            chunks: None,
            summary: None,
            workbook: None,
            mind_map: None,
            chat_history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the document and discard everything derived from the old one.
    pub fn load_document(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.reset();
        let document = Document { name: name.into(), text: text.into() };
        info!(
            session = %self.id,
            document = %document.name,
            chars = document.text.chars().count(),
            "Loaded document"
        );
        self.document = Some(document);
    }

    /// Extract a file's text and load it.
    pub fn load_file(&mut self, path: &Path) -> Result<(), SessionError> {
        let extracted = DocumentExtractor::default().extract_file(path)?;
        self.load_document(extracted.filename, extracted.text);
        Ok(())
    }

    /// Clear derived artifacts and chat history, keeping the document.
    pub fn reset(&mut self) {
        self.chunks = None;
        self.summary = None;
        self.workbook = None;
        self.mind_map = None;
        self.index.clear();
        self.chat_history.clear();
        self.touch();
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Chunks of the current document, computed on first use.
    pub fn chunks(&mut self) -> Result<&[Chunk], SessionError> {
        if self.chunks.is_none() {
            let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
            let tokenizer = tokenizer_for(&self.config.openai.completion_model);
            let chunks = chunk_text(&document.text, tokenizer.as_ref(), &self.config.chunking)?;
            self.chunks = Some(chunks);
            self.touch();
        }
        Ok(self.chunks.as_deref().unwrap_or(&[]))
    }

    /// Run the map-reduce summary, replacing any earlier one.
    pub fn summarize(
        &mut self,
        backend: &dyn CompletionBackend,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<&FinalSummary, SessionError> {
        self.summary = None;
        self.chunks()?;
        let chunks = self.chunks.as_deref().unwrap_or(&[]);
        let summary = Summarizer::new(backend, &self.config.summary).summarize(chunks, progress)?;
        self.touch();
        Ok(&*self.summary.insert(summary))
    }

    pub fn summary(&self) -> Option<&FinalSummary> {
        self.summary.as_ref()
    }

    pub fn mind_map_structure(&self) -> Result<MindMap, SessionError> {
        self.summary.as_ref().map(FinalSummary::structure).ok_or(SessionError::NoSummary)
    }

    /// Draw the summary's mind map on a board.
    pub fn render_mind_map(
        &mut self,
        api: &dyn BoardApi,
        board_id: Option<&str>,
    ) -> Result<&RenderedBoard, SessionError> {
        let structure = self.mind_map_structure()?;
        let rendered = render_mind_map(api, &structure, board_id)?;
        self.touch();
        Ok(&*self.mind_map.insert(rendered))
    }

    pub fn generate_workbook(&mut self, backend: &dyn CompletionBackend) -> Result<&Workbook, SessionError> {
        let summary = self.summary.as_ref().ok_or(SessionError::NoSummary)?;
        let workbook = generate_workbook(
            backend,
            &summary.text,
            self.config.summary.workbook_temperature,
            &self.config.openai.fallback_model,
        )?;
        self.touch();
        Ok(&*self.workbook.insert(workbook))
    }

    pub fn workbook(&self) -> Option<&Workbook> {
        self.workbook.as_ref()
    }

    /// Build the embedding index over the document's chunks.
    ///
    /// Greets the reader if the conversation is empty.
    pub fn init_chat(
        &mut self,
        embedder: &dyn EmbeddingBackend,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<IndexReport, SessionError> {
        self.chunks()?;
        let chunks = self.chunks.as_deref().unwrap_or(&[]);
        let report = self.index.initialize(chunks, embedder, progress);
        if self.chat_history.is_empty() {
            self.chat_history.push(ChatMessage::assistant(WELCOME_MESSAGE));
        }
        self.touch();
        Ok(report)
    }

    pub fn is_chat_ready(&self) -> bool {
        self.index.is_initialized()
    }

    /// Ask a question. The question and the reply are both appended to the
    /// history, including the fixed reply when answering fails.
    pub fn ask(
        &mut self,
        query: &str,
        completion: &dyn CompletionBackend,
        embedder: &dyn EmbeddingBackend,
    ) -> Answer {
        let engine = ChatEngine::new(completion, embedder, &self.config.retrieval);
        let answer = engine.answer(&mut self.index, query, &self.chat_history);
        self.chat_history.push(ChatMessage::user(query));
        self.chat_history.push(ChatMessage::assistant(answer.text.clone()));
        self.touch();
        answer
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            created: self.created,
            updated: self.updated,
            document: self.document.as_ref().map(|d| d.name.clone()),
            document_chars: self.document.as_ref().map(|d| d.text.chars().count()).unwrap_or(0),
            chunk_count: self.chunks.as_ref().map(Vec::len).unwrap_or(0),
            has_summary: self.summary.is_some(),
            has_workbook: self.workbook.is_some(),
            mind_map_url: self.mind_map.as_ref().map(|m| m.board_url.clone()),
            indexed_chunks: self.index.len(),
            chat_turns: self.chat_history.len(),
        }
    }

    fn touch(&mut self) {
        self.updated = Utc::now();
    }
}
