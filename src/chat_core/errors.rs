//! Chat pipeline error types.
//!
//! `PlannerError` never leaves the planner gateway. `ChatError` is the only
//! error a chat request can fail with.

use thiserror::Error;

use crate::completion::{CompletionError, CompletionErrorKind};

/// Reasons the planner produced no queries. Always swallowed.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("planner timeout after {secs}s")]
    Timeout { secs: u64 },

    #[error("planner reply is not JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("planner reply has no `queries` array")]
    MissingQueries,
}

/// Fatal chat errors. Only the final completion call produces these.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("chat request timed out after {secs}s")]
    Timeout { secs: u64 },
}

const GENERIC_FAILURE: &str =
    "The assistant is temporarily unavailable. Please try again in a moment.";

impl ChatError {
    /// 500 when credentials are missing, 502 for every upstream failure.
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::Completion(CompletionError::NoApiKey) => 500,
            _ => 502,
        }
    }

    /// The contract-level error kind, for logs and privileged callers.
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            ChatError::Completion(e) => e.kind(),
            ChatError::Timeout { .. } => CompletionErrorKind::HttpError,
        }
    }

    /// Detailed text for privileged callers, a generic one otherwise.
    pub fn user_message(&self, privileged: bool) -> String {
        if !privileged {
            return GENERIC_FAILURE.to_string();
        }
        match self {
            ChatError::Completion(CompletionError::NoApiKey) => {
                "Completion service API key is not configured (no_api_key).".to_string()
            }
            ChatError::Completion(CompletionError::HttpError { status, body }) => {
                format!(
                    "Completion service returned HTTP {status} (http_error): {}",
                    crate::chat_core::text::truncate_chars(body, 200)
                )
            }
            ChatError::Completion(e) => format!("{e} ({})", e.kind().as_str()),
            ChatError::Timeout { secs } => {
                format!("Chat request timed out after {secs}s (http_error).")
            }
        }
    }
}
