//! Context Budget
//!
//! Turns ranked search results into a single prompt context block that never
//! exceeds a character budget.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::SearchResult;

/// Default context budget (characters)
pub const DEFAULT_CONTEXT_CHARS: usize = 8_000;
/// A truncated chunk shorter than this is not worth including
pub const MIN_PARTIAL_CHARS: usize = 500;
/// Placed between excerpts
pub const EXCERPT_SEPARATOR: &str = "\n\n---\n\n";

/// Character budget for assembled context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBudget {
    pub max_chars: usize,
    pub min_partial_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CONTEXT_CHARS,
            min_partial_chars: MIN_PARTIAL_CHARS,
        }
    }
}

/// Context block ready for prompting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssembledContext {
    pub text: String,
    /// Excerpts included (whole or truncated)
    pub excerpt_count: usize,
    /// Whether the last excerpt was cut short
    pub truncated: bool,
}

impl AssembledContext {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

impl ContextBudget {
    pub fn new(max_chars: usize, min_partial_chars: usize) -> Self {
        Self { max_chars, min_partial_chars }
    }

    /// Assemble context from ranked results.
    ///
    /// When everything fits, results are joined in the order given. Otherwise
    /// they are re-sorted by descending score and whole excerpts are added
    /// greedily; the first excerpt that does not fit is included as a prefix only
    /// if more than `min_partial_chars` of budget remain.
    pub fn assemble(&self, results: &[SearchResult]) -> AssembledContext {
        let sep_len = EXCERPT_SEPARATOR.chars().count();
        let naive_len: usize = results.iter().map(|r| r.content.chars().count()).sum::<usize>()
            + sep_len * results.len().saturating_sub(1);

        if naive_len <= self.max_chars {
            return AssembledContext {
                text: join_excerpts(results.iter().map(|r| r.content.as_str())),
                excerpt_count: results.len(),
                truncated: false,
            };
        }

        let mut ranked: Vec<&SearchResult> = results.iter().collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut excerpts: Vec<String> = Vec::new();
        let mut used = 0usize;
        let mut truncated = false;

        for result in ranked {
            let separator_cost = if excerpts.is_empty() { 0 } else { sep_len };
            let len = result.content.chars().count();

            if used + separator_cost + len <= self.max_chars {
                used += separator_cost + len;
                excerpts.push(result.content.clone());
                continue;
            }

            let remaining = self.max_chars.saturating_sub(used + separator_cost);
            if remaining > self.min_partial_chars {
                excerpts.push(result.content.chars().take(remaining).collect());
                truncated = true;
            }
            break;
        }

        debug!(
            available = results.len(),
            included = excerpts.len(),
            truncated,
            budget = self.max_chars,
            "Context trimmed to budget"
        );

        AssembledContext {
            text: join_excerpts(excerpts.iter().map(String::as_str)),
            excerpt_count: excerpts.len(),
            truncated,
        }
    }
}

fn join_excerpts<'a>(excerpts: impl Iterator<Item = &'a str>) -> String {
    excerpts.collect::<Vec<_>>().join(EXCERPT_SEPARATOR)
}
