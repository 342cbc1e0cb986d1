//! Chat pipeline: one user message in, one structured reply out.
//!
//! Stages:
//! 1. **Classify**: keyword hits + page type resolve the intent
//! 2. **Fetch**: two branches run concurrently
//!    - deterministic breakdown queries, screened for anomalies
//!    - digest, then planner, then validator, then enrichment queries
//! 3. **Assemble**: the context blocks, in fixed order, once both branches end
//! 4. **Complete**: the final completion call, the only fatal stage
//! 5. **Parse**: the reply is resolved to talk or advice
//!
//! Everything before step 4 is fail-soft. A single end-to-end timeout bounds
//! the whole run.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::Instrument;

use crate::analytics::{AnalyticsProvider, Cache, KeywordProvider};
use crate::completion::response_parser::parse_response_with_stage;
use crate::completion::{CompletionRequest, CompletionService, InputMessage};
use crate::config::CopilotConfig;

use super::anomaly::AnomalyDetector;
use super::context::{ContextAssembler, ContextInputs, ScreenedResult};
use super::dates::DateRangeExtractor;
use super::digest::DigestBuilder;
use super::errors::ChatError;
use super::executor::QueryExecutor;
use super::intent::IntentResolver;
use super::keywords::KeywordClassifier;
use super::planner::PlannerGateway;
use super::query_templates::DeterministicQueryBuilder;
use super::query_validator::QueryValidator;
use super::text::estimate_tokens;
use super::types::{ChatReply, ChatRequest, PageType};

pub struct ChatPipeline {
    completion: Arc<dyn CompletionService>,
    executor: QueryExecutor,
    planner: PlannerGateway,
    digest: DigestBuilder,
    classifier: KeywordClassifier,
    resolver: IntentResolver,
    templates: DeterministicQueryBuilder,
    detector: AnomalyDetector,
    assembler: ContextAssembler,
    model: String,
    max_output_tokens: u32,
    history_limit: usize,
    max_enrichment_queries: usize,
    request_timeout: Duration,
    fixed_today: Option<NaiveDate>,
}

impl ChatPipeline {
    pub fn new(
        config: &CopilotConfig,
        completion: Arc<dyn CompletionService>,
        analytics: Arc<dyn AnalyticsProvider>,
        keywords: Arc<dyn KeywordProvider>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        let executor = QueryExecutor::new(analytics, keywords, cache, &config.cache)
            .with_fetch_timeout(Duration::from_secs(config.analytics.timeout_secs));
        let planner = PlannerGateway::new(
            completion.clone(),
            &config.completion,
            Duration::from_secs(config.pipeline.planner_timeout_secs),
        );

        Self {
            completion,
            executor,
            planner,
            digest: DigestBuilder::new(Duration::from_secs(config.cache.digest_ttl_secs)),
            classifier: KeywordClassifier::new(),
            resolver: IntentResolver::new(),
            templates: DeterministicQueryBuilder::new(),
            detector: AnomalyDetector::new(config.anomaly.clone()),
            assembler: ContextAssembler::new(),
            model: config.completion.model.clone(),
            max_output_tokens: config.completion.max_output_tokens,
            history_limit: config.pipeline.history_limit,
            max_enrichment_queries: config.pipeline.max_enrichment_queries,
            request_timeout: Duration::from_secs(config.pipeline.request_timeout_secs),
            fixed_today: None,
        }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Run one chat request end to end.
    pub async fn run(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let span = tracing::info_span!(
            "chat",
            request_id = %request.request_id,
            user_id = %request.user_id
        );
        let secs = self.request_timeout.as_secs();
        match tokio::time::timeout(self.request_timeout, self.run_stages(request).instrument(span))
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_secs = secs, "pipeline: request timed out");
                Err(ChatError::Timeout { secs })
            }
        }
    }

    async fn run_stages(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let today = self.today();

        // ── Classify ──
        let page_type = PageType::from_page(request.current_page.as_ref());
        let hits = self.classifier.classify(&request.message);
        let intent = self.resolver.resolve(&hits, page_type);
        tracing::info!(
            page_type = page_type.as_str(),
            intent = intent.intent.as_str(),
            target = intent.target.as_str(),
            needs_page = intent.needs_page,
            needs_analytics = intent.needs_analytics,
            guardrail = intent.guardrail_applied,
            "pipeline: intent resolved"
        );

        let analytics_ready = intent.needs_analytics && request.target.is_configured();
        if intent.needs_analytics && !analytics_ready {
            tracing::info!("pipeline: no analytics source connected, skipping enrichment");
        }
        let extractor = DateRangeExtractor::new(today);
        let range = extractor.extract(&request.message);
        let breakdowns = if analytics_ready {
            self.templates.build(&hits, range)
        } else {
            Vec::new()
        };
        tracing::debug!(
            range = %range,
            explicit_period = extractor.has_explicit_period(&request.message),
            breakdowns = breakdowns.len(),
            "pipeline: deterministic queries built"
        );

        // ── Fetch ──
        let flexible_branch = async {
            let results = self
                .executor
                .run_flexible(&request.user_id, &request.target, &breakdowns)
                .await;
            results
                .into_iter()
                .map(|result| {
                    let anomaly_summary = self.detector.summarize(&result);
                    ScreenedResult {
                        result,
                        anomaly_summary,
                    }
                })
                .collect::<Vec<_>>()
        };

        let enrichment_branch = async {
            if !analytics_ready {
                return (None, Vec::new());
            }
            let digest = self
                .digest
                .build(&self.executor, &request.user_id, &request.target, today)
                .await;
            let proposed = self
                .planner
                .plan(&request.message, &intent, digest.as_deref(), today)
                .await;
            let queries =
                QueryValidator::new(today, self.max_enrichment_queries).validate(&proposed);
            tracing::info!(
                proposed = proposed.len(),
                accepted = queries.len(),
                "pipeline: enrichment queries validated"
            );
            let enrichment = self
                .executor
                .run_enrichment(&request.user_id, &request.target, &queries)
                .await;
            (digest, enrichment)
        };

        let (flexible, (digest, enrichment)) = tokio::join!(flexible_branch, enrichment_branch);
        tracing::info!(
            breakdowns = flexible.len(),
            anomalies = flexible.iter().filter(|s| s.anomaly_summary.is_some()).count(),
            enrichment = enrichment.len(),
            has_digest = digest.is_some(),
            "pipeline: fetch complete"
        );

        // ── Assemble ──
        let instructions = self.assembler.assemble(&ContextInputs {
            page_type,
            intent: &intent,
            current_page: request.current_page.as_ref(),
            section: request.section_context.as_ref(),
            digest: digest.as_deref(),
            flexible: &flexible,
            enrichment: &enrichment,
        });

        let skip = request.history.len().saturating_sub(self.history_limit);
        let mut input: Vec<InputMessage> = request.history.into_iter().skip(skip).collect();
        input.push(InputMessage::user(request.message));

        tracing::info!(
            instructions_tokens = estimate_tokens(&instructions),
            input_messages = input.len(),
            "pipeline: context assembled"
        );

        // ── Complete ──
        let raw = self
            .completion
            .send(CompletionRequest {
                model: self.model.clone(),
                instructions,
                input,
                max_output_tokens: self.max_output_tokens,
            })
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, kind = e.kind().as_str(), "pipeline: completion failed");
                ChatError::from(e)
            })?;

        // ── Parse ──
        let (structured, stage) = parse_response_with_stage(&raw);
        tracing::info!(
            stage = stage.as_str(),
            support_notice = structured.support_notice(),
            "pipeline: reply parsed"
        );

        Ok(ChatReply {
            content: structured.to_plain_text(),
            structured,
            intent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsTarget, MemoryCache};
    use crate::chat_core::test_support::{
        report_with_rows, target, FakeAnalytics, FakeCompletion, FakeKeywords,
    };
    use crate::chat_core::types::{CurrentPage, Intent};
    use crate::completion::{CompletionError, ParsedResponse};
    use async_trait::async_trait;

    const ADVICE: &str = r#"{"type":"advice","summary":"Organic search fell.","sections":[{"title":"Next steps","items":["Check rankings"]}]}"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn is_planner(request: &CompletionRequest) -> bool {
        request.instructions.starts_with("You plan analytics lookups")
    }

    fn pipeline(
        completion: Arc<dyn CompletionService>,
        analytics: Arc<FakeAnalytics>,
    ) -> ChatPipeline {
        ChatPipeline::new(
            &CopilotConfig::default(),
            completion,
            analytics,
            Arc::new(FakeKeywords::default()),
            Arc::new(MemoryCache::new()),
        )
        .with_today(today())
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            request_id: "req-1".into(),
            user_id: "u1".into(),
            target: target(),
            message: message.into(),
            ..Default::default()
        }
    }

    fn planning_completion() -> Arc<FakeCompletion> {
        Arc::new(FakeCompletion::new(|req| {
            if is_planner(req) {
                Ok(r#"{"queries":[{"type":"daily","start":"2026-09-01","end":"2026-09-30","compare":true},{"type":"bogus"}]}"#.into())
            } else {
                Ok(ADVICE.into())
            }
        }))
    }

    #[tokio::test]
    async fn test_reason_question_end_to_end() {
        let completion = planning_completion();
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "date",
            &[("20260901", 40.0), ("20260902", 35.0)],
        )));
        let pipeline = pipeline(completion.clone(), analytics.clone());

        let reply = pipeline
            .run(request("Why did visits drop in September?"))
            .await
            .unwrap();

        assert_eq!(reply.intent.intent, Intent::ReasonAnalysis);
        assert!(reply.intent.needs_analytics);
        assert!(analytics.calls().iter().all(|c| !c.starts_with("flexible:")));

        let requests = completion.requests();
        assert_eq!(requests.len(), 2);
        assert!(is_planner(&requests[0]));

        let final_instructions = &requests[1].instructions;
        assert!(final_instructions.contains("## Analytics overview"));
        assert!(final_instructions.contains("### Daily trend (2026-09-01 to 2026-09-30)"));
        assert!(final_instructions.contains("Compared with previous period"));
        assert!(!final_instructions.contains("## Breakdown data"));

        assert!(matches!(reply.structured, ParsedResponse::Advice { .. }));
        assert!(reply.content.starts_with("Organic search fell."));
    }

    #[tokio::test]
    async fn test_breakdown_question_includes_tables_and_anomalies() {
        let completion = planning_completion();
        let mut rows: Vec<(String, f64)> = vec![("Botland".into(), 1000.0)];
        rows.extend((0..9).map(|i| (format!("Country {i}"), 50.0)));
        let borrowed: Vec<(&str, f64)> = rows.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "country", &borrowed,
        )));
        let pipeline = pipeline(completion.clone(), analytics.clone());

        let mut req = request("Which country sends the most sessions?");
        req.current_page = Some(CurrentPage {
            url: "https://app.example.com/dashboard".into(),
            title: Some("Dashboard".into()),
        });
        let reply = pipeline.run(req).await.unwrap();

        assert!(reply.intent.guardrail_applied);
        assert!(analytics.calls().iter().any(|c| c.starts_with("flexible:country")));

        let final_request = completion.requests().into_iter().find(|r| !is_planner(r)).unwrap();
        let text = final_request.instructions;
        assert!(text.contains("## Target"));
        assert!(text.contains("## Page context\nURL: https://app.example.com/dashboard"));
        assert!(text.contains("### Sessions by country"));
        assert!(text.contains("Possible anomalies in Sessions by country: Botland"));
        assert!(text.find("## Breakdown data").unwrap() < text.find("## Additional data").unwrap());
    }

    #[tokio::test]
    async fn test_planner_failure_is_not_fatal() {
        let completion = Arc::new(FakeCompletion::new(|req| {
            if is_planner(req) {
                Err(CompletionError::HttpError {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok(r#"{"type":"talk","text":"Traffic is steady."}"#.into())
            }
        }));
        let pipeline = pipeline(completion.clone(), Arc::new(FakeAnalytics::failing()));

        let reply = pipeline
            .run(request("Why did visits drop in September?"))
            .await
            .unwrap();
        assert_eq!(reply.content, "Traffic is steady.");
        assert_eq!(completion.requests().len(), 2);
        let text = &completion.requests()[1].instructions;
        assert!(!text.contains("## Analytics overview"));
        assert!(!text.contains("## Additional data"));
    }

    #[tokio::test]
    async fn test_no_target_skips_analytics_and_planner() {
        let completion = Arc::new(FakeCompletion::replying("Hello! How can I help?"));
        let analytics = Arc::new(FakeAnalytics::default());
        let pipeline = pipeline(completion.clone(), analytics.clone());

        let mut req = request("Why did visits drop in September?");
        req.target = AnalyticsTarget::default();
        let reply = pipeline.run(req).await.unwrap();

        assert_eq!(reply.content, "Hello! How can I help?");
        assert_eq!(completion.requests().len(), 1);
        assert!(analytics.calls().is_empty());
    }

    #[tokio::test]
    async fn test_completion_failure_is_fatal() {
        let completion = Arc::new(FakeCompletion::new(|_| Err(CompletionError::NoApiKey)));
        let pipeline = pipeline(completion, Arc::new(FakeAnalytics::default()));

        let err = pipeline.run(request("hello")).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_history_is_truncated() {
        let completion = Arc::new(FakeCompletion::replying("ok"));
        let pipeline = pipeline(completion.clone(), Arc::new(FakeAnalytics::default()));

        let mut req = request("hello");
        req.history = (0..60)
            .map(|i| InputMessage::user(format!("message {i}")))
            .collect();
        pipeline.run(req).await.unwrap();

        let input = &completion.requests()[0].input;
        assert_eq!(input.len(), 51);
        assert_eq!(input[0].content, "message 10");
        assert_eq!(input[50].content, "hello");
    }

    struct StalledCompletion;

    #[async_trait]
    impl CompletionService for StalledCompletion {
        async fn send(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let mut config = CopilotConfig::default();
        config.pipeline.request_timeout_secs = 1;
        let pipeline = ChatPipeline::new(
            &config,
            Arc::new(StalledCompletion),
            Arc::new(FakeAnalytics::default()),
            Arc::new(FakeKeywords::default()),
            Arc::new(MemoryCache::new()),
        )
        .with_today(today());

        let err = pipeline.run(request("hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout { secs: 1 }));
        assert_eq!(err.status_code(), 502);
    }
}
