//! Progress reporting for long-running pipeline stages.

use serde::Serialize;

/// Pipeline stage being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    /// Embedding batches while building the index
    Embedding,
    /// Per-chunk extraction pass
    Map,
    /// Final organizing pass
    Reduce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub stage: Stage,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(stage: Stage, completed: usize, total: usize) -> Self {
        Self { stage, completed, total }
    }

    /// Completed share in `[0, 1]`
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f32 / self.total as f32).min(1.0)
    }
}

/// Callback that ignores progress.
pub fn ignore(_: Progress) {}
