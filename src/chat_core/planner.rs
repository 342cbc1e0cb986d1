//! Planner gateway: asks the completion service which canned enrichment
//! reports would help answer the question.
//!
//! Fail-open. Any error, timeout or malformed reply yields an empty list and
//! the request continues with whatever context it already has.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use crate::completion::json_repair::repair_truncated_json;
use crate::completion::response_parser::{parse_first_value, strip_code_fence};
use crate::completion::{CompletionRequest, CompletionService, InputMessage};
use crate::config::CompletionConfig;

use super::errors::PlannerError;
use super::text::truncate_chars;
use super::types::{IntentDescriptor, QueryKind};

/// Longest digest excerpt forwarded to the planner.
pub const MAX_DIGEST_CHARS: usize = 300;

const PLANNER_INSTRUCTIONS: &str = "You plan analytics lookups for a website traffic assistant. \
Given the user's question, its classified intent and a short digest of the site's recent \
numbers, decide which additional reports would help answer it. \
Respond with JSON only, no prose, in exactly this shape: \
{\"queries\":[{\"type\":\"<type>\",\"start\":\"YYYY-MM-DD\",\"end\":\"YYYY-MM-DD\",\"compare\":true|false}]}. \
Use compare=true when the question is about a change over time. \
Return {\"queries\":[]} when the digest already answers the question.";

fn type_catalog() -> String {
    QueryKind::ENRICHMENT
        .iter()
        .map(|k| format!("- {}: {}", k.as_str(), k.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct PlannerGateway {
    completion: Arc<dyn CompletionService>,
    model: String,
    max_output_tokens: u32,
    timeout: Duration,
}

impl PlannerGateway {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        config: &CompletionConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            completion,
            model: config.planner_model().to_string(),
            max_output_tokens: config.planner_max_output_tokens,
            timeout,
        }
    }

    /// Proposed raw queries, or an empty list on any failure.
    pub async fn plan(
        &self,
        question: &str,
        intent: &IntentDescriptor,
        digest: Option<&str>,
        today: NaiveDate,
    ) -> Vec<Value> {
        match self.try_plan(question, intent, digest, today).await {
            Ok(queries) => {
                tracing::info!(proposed = queries.len(), "planner proposed queries");
                queries
            }
            Err(e) => {
                tracing::warn!(error = %e, "planner failed, continuing without enrichment");
                Vec::new()
            }
        }
    }

    pub async fn try_plan(
        &self,
        question: &str,
        intent: &IntentDescriptor,
        digest: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<Value>, PlannerError> {
        let request = self.build_request(question, intent, digest, today);
        let raw = tokio::time::timeout(self.timeout, self.completion.send(request))
            .await
            .map_err(|_| PlannerError::Timeout {
                secs: self.timeout.as_secs(),
            })??;
        parse_plan(&raw)
    }

    fn build_request(
        &self,
        question: &str,
        intent: &IntentDescriptor,
        digest: Option<&str>,
        today: NaiveDate,
    ) -> CompletionRequest {
        let instructions = format!(
            "{PLANNER_INSTRUCTIONS}\n\nToday is {}. Allowed types:\n{}",
            today.format("%Y-%m-%d"),
            type_catalog()
        );

        let mut input = format!("Question: {question}\nIntent: {}", intent.intent.as_str());
        if let Some(digest) = digest.filter(|d| !d.trim().is_empty()) {
            input.push_str("\nDigest: ");
            input.push_str(truncate_chars(digest, MAX_DIGEST_CHARS));
        }

        CompletionRequest {
            model: self.model.clone(),
            instructions,
            input: vec![InputMessage::user(input)],
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Extract the `queries` array from a planner reply.
pub fn parse_plan(raw: &str) -> Result<Vec<Value>, PlannerError> {
    let body = strip_code_fence(raw);
    let Some(brace) = body.find('{') else {
        return Err(PlannerError::InvalidJson {
            reason: "no JSON object in reply".into(),
        });
    };
    let candidate = &body[brace..];

    let value = parse_first_value(candidate)
        .or_else(|| parse_first_value(&repair_truncated_json(candidate)))
        .ok_or_else(|| PlannerError::InvalidJson {
            reason: "unparseable after repair".into(),
        })?;

    match value.get("queries") {
        Some(Value::Array(queries)) => Ok(queries.clone()),
        _ => Err(PlannerError::MissingQueries),
    }
}
