//! Language Model Client
//!
//! Completion and embedding backends behind two narrow traits, plus the
//! blocking OpenAI HTTP implementation and its error taxonomy.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, OpenAiConfig};
use crate::documents::embeddings::Embedding;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("OpenAI API key is missing")]
    MissingApiKey,
    #[error("OpenAI rejected the API key")]
    InvalidApiKey,
    #[error("OpenAI quota exceeded")]
    QuotaExceeded,
    #[error("API key is not authorized for model {model}")]
    ModelUnauthorized { model: String },
    #[error("Rate limited by OpenAI")]
    RateLimited,
    #[error("OpenAI returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Model returned no content")]
    EmptyResponse,
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Transport(e.to_string())
    }
}

impl LlmError {
    /// Actionable message for the person running the tool.
    pub fn user_message(&self) -> &'static str {
        match self {
            LlmError::MissingApiKey => {
                "OpenAI API key is missing. Set OPENAI_API_KEY or add it to the config file."
            }
            LlmError::InvalidApiKey => {
                "Your OpenAI API key appears to be invalid. Please check that you've entered it correctly."
            }
            LlmError::QuotaExceeded => {
                "Your OpenAI account has reached its usage limit. Please check your billing status at platform.openai.com."
            }
            LlmError::ModelUnauthorized { .. } => {
                "Your API key doesn't have access to the required model. Please check your OpenAI account permissions."
            }
            LlmError::RateLimited => "OpenAI is rate limiting requests. Please wait a moment and try again.",
            _ => "Request to OpenAI failed. Please check your API key and internet connection.",
        }
    }

    /// Whether changing configuration (not retrying) is the remedy.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LlmError::MissingApiKey
                | LlmError::InvalidApiKey
                | LlmError::QuotaExceeded
                | LlmError::ModelUnauthorized { .. }
        )
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    /// Overrides the backend's default model
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, temperature: f32) -> Self {
        Self { messages, temperature, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Text completion endpoint.
pub trait CompletionBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Embedding endpoint. Returns one vector per input, in input order.
pub trait EmbeddingBackend {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Embedding>, LlmError>;
    fn dimensions(&self) -> usize;
}

/// Blocking client for OpenAI-compatible endpoints
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    completion_model: String,
    embedding_model: String,
    dimensions: usize,
}

impl OpenAiClient {
    /// Build a client. Fails with `MissingApiKey` before any network call.
    pub fn new(config: &OpenAiConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| LlmError::InvalidApiKey)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        info!(
            base_url = %config.base_url,
            completion_model = %config.completion_model,
            embedding_model = %config.embedding_model,
            "OpenAI client ready"
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            completion_model: config.completion_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Self::new(&config.openai)
    }

    fn post<T: Serialize>(&self, path: &str, body: &T, model: &str) -> Result<String, LlmError> {
        let resp = self.http.post(format!("{}{}", self.base_url, path)).json(body).send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            let err = classify_failure(status.as_u16(), &text, model);
            warn!(path, status = %status, error = %err, "OpenAI request failed");
            return Err(err);
        }
        Ok(text)
    }
}

impl CompletionBackend for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.completion_model);
        debug!(model, messages = request.messages.len(), temperature = request.temperature, "Chat completion");

        let body = ChatRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let text = self.post("/chat/completions", &body, model)?;
        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Deserialize(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

impl EmbeddingBackend for OpenAiClient {
    fn embed(&self, inputs: &[&str]) -> Result<Vec<Embedding>, LlmError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.embedding_model, inputs = inputs.len(), "Embedding batch");

        let body = EmbeddingRequest { model: &self.embedding_model, input: inputs };
        let text = self.post("/embeddings", &body, &self.embedding_model)?;
        let mut parsed: EmbeddingResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Deserialize(e.to_string()))?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(LlmError::Deserialize(format!(
                "{} embeddings returned for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Map a failed response to the error taxonomy.
///
/// The structured `error.code`/`error.type` fields are checked first, then the
/// message text, then the status code.
pub fn classify_failure(status: u16, body: &str, model: &str) -> LlmError {
    let detail = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = detail.message.clone().unwrap_or_else(|| body.trim().to_string());
    let haystack = format!(
        "{} {} {}",
        detail.code.as_deref().unwrap_or(""),
        detail.kind.as_deref().unwrap_or(""),
        message
    );

    if haystack.contains("invalid_api_key") || haystack.contains("Incorrect API key") || status == 401 {
        LlmError::InvalidApiKey
    } else if haystack.contains("insufficient_quota") || haystack.contains("exceeded your current quota") {
        LlmError::QuotaExceeded
    } else if haystack.contains("model_not_found")
        || haystack.contains("does not exist")
        || haystack.contains("not authorized")
    {
        LlmError::ModelUnauthorized { model: model.to_string() }
    } else if status == 429 {
        LlmError::RateLimited
    } else {
        LlmError::Upstream { status, message }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorDetail {
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: &str, kind: &str, message: &str) -> String {
        serde_json::json!({ "error": { "code": code, "type": kind, "message": message } }).to_string()
    }

    #[test]
    fn test_classify_invalid_key() {
        let err = classify_failure(401, &body("invalid_api_key", "invalid_request_error", "Incorrect API key provided: sk-abc."), "gpt-4o-mini");
        assert_eq!(err, LlmError::InvalidApiKey);
    }

    #[test]
    fn test_classify_quota_beats_rate_limit() {
        let err = classify_failure(
            429,
            &body("insufficient_quota", "insufficient_quota", "You exceeded your current quota, please check your plan."),
            "gpt-4o-mini",
        );
        assert_eq!(err, LlmError::QuotaExceeded);
    }

    #[test]
    fn test_classify_model_unauthorized() {
        let err = classify_failure(
            404,
            &body("model_not_found", "invalid_request_error", "The model `gpt-5` does not exist or you do not have access to it."),
            "gpt-5",
        );
        assert_eq!(err, LlmError::ModelUnauthorized { model: "gpt-5".to_string() });
    }

    #[test]
    fn test_classify_plain_text_bodies() {
        assert_eq!(classify_failure(429, "slow down", "m"), LlmError::RateLimited);
        assert_eq!(
            classify_failure(500, "  upstream exploded ", "m"),
            LlmError::Upstream { status: 500, message: "upstream exploded".to_string() }
        );
        assert_eq!(
            classify_failure(403, "You are not authorized to use this model", "m"),
            LlmError::ModelUnauthorized { model: "m".to_string() }
        );
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let errors = [
            LlmError::MissingApiKey,
            LlmError::InvalidApiKey,
            LlmError::QuotaExceeded,
            LlmError::ModelUnauthorized { model: "m".to_string() },
        ];
        let messages: std::collections::HashSet<_> = errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
        assert!(errors.iter().all(LlmError::is_configuration));
        assert!(!LlmError::Transport("reset".to_string()).is_configuration());
    }

    #[test]
    fn test_client_requires_key() {
        let config = OpenAiConfig::default();
        assert!(matches!(OpenAiClient::new(&config), Err(LlmError::MissingApiKey)));

        let config = OpenAiConfig { api_key: Some("   ".to_string()), ..OpenAiConfig::default() };
        assert!(matches!(OpenAiClient::new(&config), Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let body = ChatRequest { model: "gpt-4o-mini", messages: &messages, temperature: 0.5 };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["model"], "gpt-4o-mini");
    }

    fn client_for(server: &mockito::Server) -> OpenAiClient {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            base_url: server.url(),
            embedding_dimensions: 2,
            ..OpenAiConfig::default()
        };
        OpenAiClient::new(&config).unwrap()
    }

    #[test]
    fn test_embed_restores_input_order() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data": [{"index": 1, "embedding": [0.0, 1.0]}, {"index": 0, "embedding": [1.0, 0.0]}]}"#)
            .create();

        let vectors = client_for(&server).embed(&["first", "second"]).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert();
    }

    #[test]
    fn test_embed_count_mismatch() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data": [{"index": 0, "embedding": [1.0, 0.0]}]}"#)
            .create();

        let err = client_for(&server).embed(&["a", "b"]).unwrap_err();
        assert!(matches!(err, LlmError::Deserialize(_)));
    }

    #[test]
    fn test_complete_returns_message_content() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "Carbon pricing."}}]}"#)
            .create();

        let request = CompletionRequest::new(vec![Message::user("What is needed?")], 0.5);
        assert_eq!(client_for(&server).complete(&request).unwrap(), "Carbon pricing.");
    }

    #[test]
    fn test_complete_empty_choices() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("POST", "/chat/completions").with_status(200).with_body(r#"{"choices": []}"#).create();

        let request = CompletionRequest::new(vec![Message::user("hi")], 0.5);
        assert_eq!(client_for(&server).complete(&request).unwrap_err(), LlmError::EmptyResponse);
    }

    #[test]
    fn test_complete_maps_failure_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(body("invalid_api_key", "invalid_request_error", "Incorrect API key provided."))
            .create();
        let client = client_for(&server);
        let request = CompletionRequest::new(vec![Message::user("hi")], 0.5);
        assert_eq!(client.complete(&request).unwrap_err(), LlmError::InvalidApiKey);

        server.reset();
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(429)
            .with_body(body("insufficient_quota", "insufficient_quota", "You exceeded your current quota."))
            .create();
        assert_eq!(client.embed(&["x"]).unwrap_err(), LlmError::QuotaExceeded);
    }
}
