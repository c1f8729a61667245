//! Conversational QA Engine
//!
//! Answers questions about the loaded book from retrieved excerpts. The full
//! conversation is resent with every question; nothing is kept server-side.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::context::budget::ContextBudget;
use crate::documents::retriever::EmbeddingIndex;
use crate::llm::{CompletionBackend, CompletionRequest, EmbeddingBackend, LlmError, Message};

pub const SYSTEM_PROMPT: &str = "\
You are a helpful assistant that answers questions about a book using the excerpts provided. \
Answer only from those excerpts. If the answer is not in them, say that you don't know instead of making something up. \
Quote or point to specific passages when it helps, and keep a friendly, conversational tone. \
Your goal is to help the reader understand the book deeply.";

/// Reply when no index has been built yet
pub const NOT_READY_REPLY: &str = "Please upload a book first so I can answer questions about it.";
/// Reply when the completion call fails
pub const ERROR_REPLY: &str =
    "I encountered an error when trying to answer your question. Please try again.";
/// Greeting added to an empty conversation once the index is ready
pub const WELCOME_MESSAGE: &str =
    "Hello! I'm BookGPT. Ask me any questions about the book you've uploaded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

impl From<&ChatMessage> for Message {
    fn from(m: &ChatMessage) -> Self {
        match m.role {
            ChatRole::User => Message::user(m.content.clone()),
            ChatRole::Assistant => Message::assistant(m.content.clone()),
        }
    }
}

/// One answer, successful or not
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    /// Chunks the context was drawn from, best first
    pub sources: Vec<u32>,
    pub context_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LlmError>,
    /// What the reader can do about `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl Answer {
    fn fixed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sources: Vec::new(),
            context_truncated: false,
            error: None,
            hint: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The user turn: excerpts first, then the question.
pub fn user_turn(context: &str, query: &str) -> String {
    format!(
        "Here are relevant excerpts from the book:\n\n{}\n\nBased on these excerpts, please answer the following question:\n{}",
        context, query
    )
}

/// System instruction, then prior turns in order, then the new user turn.
pub fn build_messages(context: &str, query: &str, history: &[ChatMessage]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(SYSTEM_PROMPT));
    messages.extend(history.iter().map(Message::from));
    messages.push(Message::user(user_turn(context, query)));
    messages
}

pub struct ChatEngine<'a> {
    completion: &'a dyn CompletionBackend,
    embedder: &'a dyn EmbeddingBackend,
    config: &'a RetrievalConfig,
}

impl<'a> ChatEngine<'a> {
    pub fn new(
        completion: &'a dyn CompletionBackend,
        embedder: &'a dyn EmbeddingBackend,
        config: &'a RetrievalConfig,
    ) -> Self {
        Self { completion, embedder, config }
    }

    /// Answer `query` given the conversation so far (excluding `query` itself).
    ///
    /// Never fails: an uninitialized index or a failed completion yields a
    /// fixed reply, with the error attached in the latter case.
    pub fn answer(&self, index: &mut EmbeddingIndex, query: &str, history: &[ChatMessage]) -> Answer {
        if !index.is_initialized() {
            debug!("Question asked before the index was built");
            return Answer::fixed(NOT_READY_REPLY);
        }

        let results = index.search(query, self.config.top_k, self.embedder);
        let budget = ContextBudget::new(self.config.context_char_budget, self.config.min_partial_chars);
        let context = budget.assemble(&results);
        let sources: Vec<u32> = results.iter().map(|r| r.chunk_index).collect();

        let request = CompletionRequest::new(
            build_messages(&context.text, query, history),
            self.config.chat_temperature,
        );
        match self.completion.complete(&request) {
            Ok(text) => {
                info!(
                    excerpts = context.excerpt_count,
                    context_chars = context.char_count(),
                    history = history.len(),
                    "Answered question"
                );
                Answer { text, sources, context_truncated: context.truncated, error: None, hint: None }
            }
            Err(e) => {
                warn!(error = %e, "Answer generation failed");
                Answer {
                    text: ERROR_REPLY.to_string(),
                    sources,
                    context_truncated: context.truncated,
                    hint: Some(e.user_message()),
                    error: Some(e),
                }
            }
        }
    }
}
