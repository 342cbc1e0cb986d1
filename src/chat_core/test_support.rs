//! In-memory collaborators for pipeline tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::analytics::types::{KeywordRow, KeywordTotals};
use crate::analytics::{
    AnalyticsProvider, AnalyticsTarget, Cache, CacheError, DateRange, KeywordProvider,
    KeywordReport, ProviderError, ProviderResult, Report, Row,
};
use crate::completion::{CompletionError, CompletionRequest, CompletionService};

pub(crate) fn target() -> AnalyticsTarget {
    AnalyticsTarget {
        property_id: Some("123456".into()),
        site_url: Some("https://example.com/".into()),
    }
}

/// A report with one dimension and a `sessions` metric per row.
pub(crate) fn report_with_rows(dimension: &str, rows: &[(&str, f64)]) -> Report {
    let rows: Vec<Row> = rows
        .iter()
        .map(|(value, sessions)| {
            let mut row = Row::default();
            row.dimensions.insert(dimension.to_string(), value.to_string());
            row.metrics.insert("sessions".into(), *sessions);
            row.metrics.insert("engagementRate".into(), 0.6);
            row
        })
        .collect();
    Report {
        row_count: rows.len() as u64,
        rows,
        totals: Default::default(),
    }
}

// ─── Analytics ───────────────────────────────────────────────────────────────

/// Returns the same report from every method and records each call as
/// `"<method> <range>"`.
#[derive(Default)]
pub(crate) struct FakeAnalytics {
    report: Report,
    fail_all: bool,
    fail_range: Option<DateRange>,
    calls: Mutex<Vec<String>>,
}

impl FakeAnalytics {
    pub(crate) fn with_report(report: Report) -> Self {
        Self {
            report,
            ..Default::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub(crate) fn failing_for(mut self, range: DateRange) -> Self {
        self.fail_range = Some(range);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn respond(&self, method: &str, range: DateRange) -> ProviderResult<Report> {
        self.calls.lock().unwrap().push(format!("{method} {range}"));
        if self.fail_all || self.fail_range == Some(range) {
            return Err(ProviderError::PermissionDenied {
                body: "denied".into(),
            });
        }
        Ok(self.report.clone())
    }
}

#[async_trait]
impl AnalyticsProvider for FakeAnalytics {
    async fn fetch_summary(&self, _property_id: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("summary", range)
    }

    async fn fetch_daily_series(&self, _: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("daily", range)
    }

    async fn fetch_page_details(&self, _: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("pages", range)
    }

    async fn fetch_device_details(&self, _: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("devices", range)
    }

    async fn fetch_device_daily_series(
        &self,
        _: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.respond("device_daily", range)
    }

    async fn fetch_source_breakdown(&self, _: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("sources", range)
    }

    async fn fetch_region_details(&self, _: &str, range: DateRange) -> ProviderResult<Report> {
        self.respond("regions", range)
    }

    async fn fetch_flexible_report(
        &self,
        _: &str,
        range: DateRange,
        dimensions: &[String],
        _metrics: &[String],
        _limit: u32,
    ) -> ProviderResult<Report> {
        self.respond(&format!("flexible:{}", dimensions.join(",")), range)
    }
}

pub(crate) struct FakeKeywords {
    report: KeywordReport,
}

impl Default for FakeKeywords {
    fn default() -> Self {
        Self {
            report: KeywordReport {
                total: KeywordTotals {
                    impressions: 1000.0,
                    clicks: 50.0,
                    ctr: 0.05,
                },
                keywords: vec![KeywordRow {
                    query: "traffic report".into(),
                    impressions: 400.0,
                    clicks: 20.0,
                    ctr: 0.05,
                    position: 4.2,
                }],
            },
        }
    }
}

#[async_trait]
impl KeywordProvider for FakeKeywords {
    async fn fetch_keyword_data(
        &self,
        _site_url: &str,
        _range: DateRange,
    ) -> ProviderResult<KeywordReport> {
        Ok(self.report.clone())
    }
}

// ─── Completion ──────────────────────────────────────────────────────────────

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync>;

/// Answers through a closure and records every request.
pub(crate) struct FakeCompletion {
    responder: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub(crate) fn new(
        responder: impl Fn(&CompletionRequest) -> Result<String, CompletionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_| Ok(reply.clone()))
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn send(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let reply = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        reply
    }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// Every operation fails.
pub(crate) struct FailingCache;

#[async_trait]
impl Cache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Storage {
            reason: "unavailable".into(),
        })
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Storage {
            reason: "unavailable".into(),
        })
    }
}
