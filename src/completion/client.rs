//! Completion Service contract and its HTTP implementation.
//!
//! `ResponsesClient` talks to an OpenAI-Responses-compatible endpoint
//! (`POST {base_url}/responses`). The pipeline only depends on the
//! `CompletionService` trait.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::errors::CompletionError;
use super::types::{CompletionRequest, CompletionResponse};
use crate::config::CompletionConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the error body kept in `HttpError`.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ─── Contract ────────────────────────────────────────────────────────────────

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Send one request and return the reply text.
    async fn send(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

// ─── ResponsesClient ─────────────────────────────────────────────────────────

pub struct ResponsesClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl ResponsesClient {
    /// Create a client from configuration. Does NOT check connectivity or
    /// the key; a missing key surfaces as `NoApiKey` on the first `send`.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CompletionError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CompletionError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl CompletionService for ResponsesClient {
    async fn send(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::NoApiKey)?;
        let url = format!("{}/responses", self.base_url);

        // Metadata only; prompt bodies are never logged.
        tracing::info!(
            url = %url,
            model = %request.model,
            input_count = request.input.len(),
            instructions_chars = request.instructions.chars().count(),
            max_output_tokens = request.max_output_tokens,
            "=== COMPLETION REQUEST ==="
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout {
                        duration_secs: self.timeout_secs,
                    }
                } else {
                    CompletionError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::HttpError {
                status: status.as_u16(),
                body: body_text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| CompletionError::ConnectionFailed {
                endpoint: url.clone(),
                reason: format!("failed to read response body: {e}"),
            })?;

        let parsed: CompletionResponse =
            serde_json::from_str(&body_text).map_err(|_| CompletionError::EmptyResponse)?;
        let text = parsed.text().ok_or(CompletionError::EmptyResponse)?;

        tracing::info!(
            model = %request.model,
            reply_chars = text.chars().count(),
            "=== COMPLETION RESPONSE ==="
        );

        Ok(text)
    }
}
