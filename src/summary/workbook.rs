//! Workbook generation: one completion turning a summary into exercises.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::{CompletionBackend, CompletionRequest, LlmError, Message};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that creates practical workbooks from non-fiction books, focusing on extracting actionable exercises that readers can implement in their daily lives.";

const WORKBOOK_PROMPT: &str = "\
Turn this non-fiction book summary into a hands-on workbook. Draw out:
1. Exercises the book itself recommends
2. Ways to put each key concept into practice
3. Reflection questions that connect the ideas to the reader's own life
4. Habit-building activities grounded in the book's principles
5. Self-assessment tools for tracking progress

For every exercise give:
- A title
- Its purpose
- Step-by-step instructions
- Time required, if any
- Materials needed, if any
- Expected outcome

Keep every exercise concrete enough that the reader can start today.

# Book Summary
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workbook {
    pub text: String,
    /// Set when the primary model was refused and the fallback answered
    pub fallback_model: Option<String>,
}

/// Generate a workbook from a final summary.
///
/// When the primary model is refused, the request is retried once with
/// `fallback_model`. Every other failure is returned as is.
pub fn generate_workbook(
    backend: &dyn CompletionBackend,
    summary: &str,
    temperature: f32,
    fallback_model: &str,
) -> Result<Workbook, LlmError> {
    let request = CompletionRequest::new(
        vec![Message::system(SYSTEM_PROMPT), Message::user(format!("{}{}", WORKBOOK_PROMPT, summary))],
        temperature,
    );

    match backend.complete(&request) {
        Ok(text) => {
            info!(chars = text.len(), "Workbook generated");
            Ok(Workbook { text, fallback_model: None })
        }
        Err(LlmError::ModelUnauthorized { model }) => {
            warn!(model = %model, fallback = fallback_model, "Model refused; retrying workbook with fallback");
            let text = backend.complete(&request.with_model(fallback_model))?;
            Ok(Workbook { text, fallback_model: Some(fallback_model.to_string()) })
        }
        Err(e) => Err(e),
    }
}
