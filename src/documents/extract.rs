//! Document Text Extraction
//!
//! Plain-text files are read directly. PDFs go through an ordered chain of
//! providers; the first one that produces text wins.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum file size (50 MB) accepted for extraction.
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("File too large: {0} bytes (max {1} bytes)")]
    FileTooLarge(u64, u64),
    #[error("{provider} failed: {message}")]
    Provider { provider: &'static str, message: String },
    #[error("Could not extract text: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),
}

impl Serialize for ExtractError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Something that can turn PDF bytes into text.
pub trait TextExtractor {
    fn name(&self) -> &'static str;
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// Whole-document extraction via `pdf-extract`
pub struct PdfExtractProvider;

impl TextExtractor for PdfExtractProvider {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let fail = |message: String| ExtractError::Provider { provider: "pdf-extract", message };
        // pdf-extract panics on some malformed documents
        match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(fail(e.to_string())),
            Err(_) => Err(fail("parser panicked".to_string())),
        }
    }
}

/// Page-by-page extraction via `lopdf`; pages are joined by a blank line.
pub struct LopdfProvider;

impl TextExtractor for LopdfProvider {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let fail = |message: String| ExtractError::Provider { provider: "lopdf", message };
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| fail(e.to_string()))?;

        let mut pages = Vec::new();
        for page_number in doc.get_pages().keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => pages.push(text),
                Err(e) => debug!(page = page_number, error = %e, "Skipping unreadable page"),
            }
        }
        if pages.is_empty() {
            return Err(fail("no readable pages".to_string()));
        }
        Ok(pages.join("\n\n"))
    }
}

/// Extracted text plus where it came from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub filename: String,
    pub text: String,
    /// Provider that produced the text (`plain-text` for direct reads)
    pub provider: String,
    pub bytes: u64,
}

/// Ordered provider chain
pub struct DocumentExtractor {
    providers: Vec<Box<dyn TextExtractor>>,
    max_file_size: u64,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(vec![Box::new(PdfExtractProvider), Box::new(LopdfProvider)])
    }
}

impl DocumentExtractor {
    pub fn new(providers: Vec<Box<dyn TextExtractor>>) -> Self {
        Self { providers, max_file_size: MAX_FILE_SIZE }
    }

    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = max;
        self
    }

    /// Read a file and extract its text according to its extension.
    pub fn extract_file(&self, path: &Path) -> Result<ExtractedDocument, ExtractError> {
        let size = fs::metadata(path)?.len();
        if size > self.max_file_size {
            return Err(ExtractError::FileTooLarge(size, self.max_file_size));
        }

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let (text, provider) = match extension.as_str() {
            "txt" | "md" | "markdown" => (fs::read_to_string(path)?, "plain-text".to_string()),
            "pdf" => {
                let bytes = fs::read(path)?;
                let (text, provider) = self.extract_pdf(&bytes)?;
                (text, provider.to_string())
            }
            other => return Err(ExtractError::UnsupportedType(other.to_string())),
        };

        info!(
            file = %filename,
            provider = %provider,
            bytes = size,
            chars = text.chars().count(),
            "Extracted document text"
        );
        Ok(ExtractedDocument { filename, text, provider, bytes: size })
    }

    /// Try each provider in order.
    ///
    /// A provider returning only whitespace counts as a miss; if every
    /// provider ran but none found text, the empty result is returned so the
    /// chunker can mark the document as having no content.
    pub fn extract_pdf(&self, bytes: &[u8]) -> Result<(String, &'static str), ExtractError> {
        let mut failures = Vec::new();
        let mut empty_from = None;

        for provider in &self.providers {
            match provider.extract(bytes) {
                Ok(text) if !text.trim().is_empty() => return Ok((text, provider.name())),
                Ok(_) => {
                    debug!(provider = provider.name(), "Provider found no text");
                    empty_from.get_or_insert(provider.name());
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Extraction provider failed; trying next");
                    failures.push(e.to_string());
                }
            }
        }

        match empty_from {
            Some(name) => Ok((String::new(), name)),
            None => Err(ExtractError::AllProvidersFailed(failures)),
        }
    }
}

/// Extract with the default provider chain.
pub fn extract_document(path: &Path) -> Result<ExtractedDocument, ExtractError> {
    DocumentExtractor::default().extract_file(path)
}
