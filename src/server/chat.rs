//! `POST /api/chat`: inbound envelope, caller identity and status mapping.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::AppState;
use crate::analytics::AnalyticsTarget;
use crate::chat_core::{ChatRequest, CurrentPage, SectionContext};
use crate::completion::{InputMessage, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PROPERTY_ID_HEADER: &str = "x-property-id";
pub const SITE_URL_HEADER: &str = "x-site-url";
pub const CALLER_ROLE_HEADER: &str = "x-caller-role";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub current_page: Option<CurrentPage>,
    #[serde(default)]
    pub section_context: Option<SectionContext>,
}

/// Who is asking, as asserted by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub target: AnalyticsTarget,
    pub privileged: bool,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn caller_from_headers(headers: &HeaderMap) -> Caller {
    Caller {
        user_id: header(headers, USER_ID_HEADER).unwrap_or_else(|| "anonymous".to_string()),
        target: AnalyticsTarget {
            property_id: header(headers, PROPERTY_ID_HEADER),
            site_url: header(headers, SITE_URL_HEADER),
        },
        privileged: header(headers, CALLER_ROLE_HEADER)
            .is_some_and(|r| r.eq_ignore_ascii_case("admin")),
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

pub async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "rejected chat body");
            return failure(StatusCode::BAD_REQUEST, "Invalid request body.");
        }
    };
    if body.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Message must not be empty.");
    }

    let caller = caller_from_headers(&headers);
    let request_id =
        header(&headers, REQUEST_ID_HEADER).unwrap_or_else(|| Uuid::new_v4().to_string());

    // Unknown roles are dropped rather than rejected.
    let history = body
        .history
        .into_iter()
        .filter_map(|h| {
            Role::parse(&h.role).map(|role| InputMessage {
                role,
                content: h.content,
            })
        })
        .collect();

    let request = ChatRequest {
        request_id,
        user_id: caller.user_id,
        target: caller.target,
        message: body.message,
        history,
        current_page: body.current_page,
        section_context: body.section_context,
    };

    match state.pipeline.run(request).await {
        Ok(reply) => Json(json!({
            "success": true,
            "data": {
                "message": {
                    "role": "assistant",
                    "content": reply.content,
                    "structured": reply.structured,
                }
            }
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind().as_str(), "chat request failed");
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
            failure(status, e.user_message(caller.privileged))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MemoryCache;
    use crate::chat_core::test_support::{FakeAnalytics, FakeCompletion, FakeKeywords};
    use crate::chat_core::ChatPipeline;
    use crate::completion::{CompletionError, CompletionService};
    use crate::config::CopilotConfig;
    use crate::server::router;
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(completion: Arc<dyn CompletionService>) -> axum::Router {
        let pipeline = ChatPipeline::new(
            &CopilotConfig::default(),
            completion,
            Arc::new(FakeAnalytics::default()),
            Arc::new(FakeKeywords::default()),
            Arc::new(MemoryCache::new()),
        );
        router(AppState {
            pipeline: Arc::new(pipeline),
        })
    }

    fn post_chat(body: serde_json::Value, role: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_ID_HEADER, "u1");
        if let Some(role) = role {
            builder = builder.header(CALLER_ROLE_HEADER, role);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_success_envelope() {
        let completion = Arc::new(FakeCompletion::replying(
            r#"{"type":"talk","text":"Hi there","support_notice":true}"#,
        ));
        let response = app(completion.clone())
            .oneshot(post_chat(
                json!({
                    "message": "hello",
                    "history": [
                        {"role": "user", "content": "earlier"},
                        {"role": "system", "content": "ignored"}
                    ],
                    "currentPage": {"url": "/chat", "title": "Chat"}
                }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["message"]["role"], "assistant");
        assert_eq!(body["data"]["message"]["content"], "Hi there");
        assert_eq!(body["data"]["message"]["structured"]["type"], "talk");
        assert_eq!(body["data"]["message"]["structured"]["supportNotice"], true);

        let sent = &completion.requests()[0].input;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "earlier");
    }

    #[tokio::test]
    async fn test_missing_key_is_500_with_generic_message() {
        let completion = Arc::new(FakeCompletion::new(|_| Err(CompletionError::NoApiKey)));
        let response = app(completion)
            .oneshot(post_chat(json!({"message": "hello"}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_json(response).await;
        assert_eq!(body["success"], false);
        assert!(!body["message"].as_str().unwrap().contains("no_api_key"));
    }

    #[tokio::test]
    async fn test_upstream_error_is_502_with_detail_for_admin() {
        let completion = Arc::new(FakeCompletion::new(|_| {
            Err(CompletionError::HttpError {
                status: 429,
                body: "rate limited".into(),
            })
        }));
        let response = app(completion)
            .oneshot(post_chat(json!({"message": "hello"}), Some("admin")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_json(response).await;
        assert!(body["message"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn test_bad_body_is_400() {
        let completion = Arc::new(FakeCompletion::replying("unused"));
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app(completion.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(completion.clone())
            .oneshot(post_chat(json!({"message": "   "}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(completion.requests().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(FakeCompletion::replying("unused")))
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ok");
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, "u42".parse().unwrap());
        headers.insert(PROPERTY_ID_HEADER, "987".parse().unwrap());
        headers.insert(CALLER_ROLE_HEADER, "Admin".parse().unwrap());
        let caller = caller_from_headers(&headers);
        assert_eq!(caller.user_id, "u42");
        assert_eq!(caller.target.property_id.as_deref(), Some("987"));
        assert!(caller.target.site_url.is_none());
        assert!(caller.privileged);

        let anon = caller_from_headers(&HeaderMap::new());
        assert_eq!(anon.user_id, "anonymous");
        assert!(!anon.privileged);
    }
}
