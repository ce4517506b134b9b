use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheError;

/// Application-level error type.
///
/// Per-prompt failures (provider errors, malformed JSON) never surface here: they are
/// folded into an error-shaped `PromptResult` by the runner. What remains is the set of
/// conditions that stop a case or the whole run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid prompt definitions or runtime configuration. Fatal before any case runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The case file is missing, unreadable, or lacks a matter identifier.
    #[error("Failed to load case {}: {reason}", path.display())]
    CaseLoad { path: PathBuf, reason: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Batch error: {0}")]
    Batch(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn case_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AppError::CaseLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a batch of cases can continue past this error.
    /// Only case-load failures are confined to a single case.
    pub fn is_case_local(&self) -> bool {
        matches!(self, AppError::CaseLoad { .. })
    }
}
