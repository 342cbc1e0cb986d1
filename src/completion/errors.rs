//! Completion Service error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility.

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while calling the Completion Service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// No API key configured.
    #[error("completion service has no API key configured")]
    NoApiKey,

    /// Non-2xx HTTP response.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// 2xx response that carried no text.
    #[error("completion service returned an empty response")]
    EmptyResponse,

    /// TCP/HTTP connection to the endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("completion timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },
}

/// The coarse error kinds exposed by the Completion Service contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    NoApiKey,
    HttpError,
    EmptyResponse,
}

impl CompletionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionErrorKind::NoApiKey => "no_api_key",
            CompletionErrorKind::HttpError => "http_error",
            CompletionErrorKind::EmptyResponse => "empty_response",
        }
    }
}

impl CompletionError {
    /// Transport failures and timeouts fold into `http_error`.
    pub fn kind(&self) -> CompletionErrorKind {
        match self {
            CompletionError::NoApiKey => CompletionErrorKind::NoApiKey,
            CompletionError::EmptyResponse => CompletionErrorKind::EmptyResponse,
            CompletionError::HttpError { .. }
            | CompletionError::ConnectionFailed { .. }
            | CompletionError::Timeout { .. } => CompletionErrorKind::HttpError,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            CompletionError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
