//! Request-scoped types flowing through the chat pipeline.

use serde::{Deserialize, Serialize};

use crate::analytics::{AnalyticsTarget, DateRange, KeywordReport, Report, Row};
use crate::completion::{InputMessage, ParsedResponse};

// ─── Page context ────────────────────────────────────────────────────────────

/// The page the user was looking at when they asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Externally supplied context for a specific section of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionContext {
    #[serde(default)]
    pub section_type: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub section_body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ReportDashboard,
    AnalysisDetail,
    Settings,
    Chat,
    Other,
    Unknown,
}

impl PageType {
    /// Classify the current page by its URL path.
    pub fn from_page(page: Option<&CurrentPage>) -> Self {
        let Some(page) = page else {
            return PageType::Unknown;
        };
        let path = url_path(&page.url).to_ascii_lowercase();
        let path = path.trim_end_matches('/');
        if path.is_empty() && page.url.trim().is_empty() {
            return PageType::Unknown;
        }

        let has_segment = |prefix: &str| path == prefix || path.starts_with(&format!("{prefix}/"));
        if has_segment("/dashboard") || has_segment("/reports") {
            PageType::ReportDashboard
        } else if path.starts_with("/analysis/") {
            PageType::AnalysisDetail
        } else if has_segment("/settings") {
            PageType::Settings
        } else if has_segment("/chat") {
            PageType::Chat
        } else {
            PageType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::ReportDashboard => "report_dashboard",
            PageType::AnalysisDetail => "analysis_detail",
            PageType::Settings => "settings",
            PageType::Chat => "chat",
            PageType::Other => "other",
            PageType::Unknown => "unknown",
        }
    }

    /// Pages that display this product's own analytics UI.
    pub fn is_report_view(&self) -> bool {
        matches!(self, PageType::ReportDashboard | PageType::AnalysisDetail)
    }

    pub fn description(&self) -> &'static str {
        match self {
            PageType::ReportDashboard => "the analytics report dashboard",
            PageType::AnalysisDetail => "a detailed analysis page",
            PageType::Settings => "the account and integration settings",
            PageType::Chat => "the standalone chat page",
            PageType::Other => "another page of this service",
            PageType::Unknown => "an unknown page",
        }
    }
}

/// Path component of an absolute or relative URL, without query or fragment.
fn url_path(url: &str) -> &str {
    let url = url.trim();
    let without_scheme = match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            rest.find('/').map(|p| &rest[p..]).unwrap_or("")
        }
        None => url,
    };
    let end = without_scheme.find(['?', '#']).unwrap_or(without_scheme.len());
    &without_scheme[..end]
}

// ─── Intent ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    HowTo,
    ReasonAnalysis,
    ReportInterpretation,
    SiteImprovement,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::HowTo => "how_to",
            Intent::ReasonAnalysis => "reason_analysis",
            Intent::ReportInterpretation => "report_interpretation",
            Intent::SiteImprovement => "site_improvement",
            Intent::General => "general",
        }
    }
}

/// What the user's question is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The client's own website.
    ClientSite,
    /// This service's settings and features.
    Settings,
    General,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::ClientSite => "client_site",
            Target::Settings => "settings",
            Target::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDescriptor {
    pub intent: Intent,
    pub target: Target,
    pub needs_page: bool,
    pub needs_analytics: bool,
    /// The report-page target correction fired.
    pub guardrail_applied: bool,
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Every query type the executor can dispatch.
///
/// The first four are deterministic flexible breakdowns; the rest are the
/// canned enrichment reports the planner may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Country,
    City,
    SourceMedium,
    LandingPage,
    Summary,
    Daily,
    Pages,
    Devices,
    DeviceDaily,
    Sources,
    Regions,
    Keywords,
}

impl QueryKind {
    /// The types the planner is allowed to propose.
    pub const ENRICHMENT: [QueryKind; 8] = [
        QueryKind::Summary,
        QueryKind::Daily,
        QueryKind::Pages,
        QueryKind::Devices,
        QueryKind::DeviceDaily,
        QueryKind::Sources,
        QueryKind::Regions,
        QueryKind::Keywords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Country => "country",
            QueryKind::City => "city",
            QueryKind::SourceMedium => "source_medium",
            QueryKind::LandingPage => "landing_page",
            QueryKind::Summary => "summary",
            QueryKind::Daily => "daily",
            QueryKind::Pages => "pages",
            QueryKind::Devices => "devices",
            QueryKind::DeviceDaily => "device_daily",
            QueryKind::Sources => "sources",
            QueryKind::Regions => "regions",
            QueryKind::Keywords => "keywords",
        }
    }

    /// Parse a planner-proposed enrichment type. Breakdown kinds are not
    /// accepted here.
    pub fn parse_enrichment(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ENRICHMENT.into_iter().find(|k| k.as_str() == raw)
    }

    pub fn is_enrichment(&self) -> bool {
        Self::ENRICHMENT.contains(self)
    }

    /// Breakdowns screened by the anomaly detector.
    pub fn is_anomaly_screened(&self) -> bool {
        matches!(
            self,
            QueryKind::Country | QueryKind::City | QueryKind::SourceMedium
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::Country => "Sessions by country",
            QueryKind::City => "Sessions by city",
            QueryKind::SourceMedium => "Sessions by source / medium",
            QueryKind::LandingPage => "Sessions by landing page",
            QueryKind::Summary => "Site summary",
            QueryKind::Daily => "Daily trend",
            QueryKind::Pages => "Top pages",
            QueryKind::Devices => "Devices",
            QueryKind::DeviceDaily => "Daily trend by device",
            QueryKind::Sources => "Traffic sources",
            QueryKind::Regions => "Regions",
            QueryKind::Keywords => "Search keywords",
        }
    }
}

/// One analytics request. Invariants after validation: `range.start <=
/// range.end <= today`, span at most 92 days, start within the last two years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub kind: QueryKind,
    /// Empty for canned enrichment reports.
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub range: DateRange,
    pub limit: u32,
    pub compare: bool,
}

impl Query {
    pub fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// Result of a flexible breakdown query. `error` carries the category message
/// when the provider failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub label: String,
    pub kind: QueryKind,
    pub range: DateRange,
    pub rows: Vec<Row>,
    pub totals: std::collections::BTreeMap<String, f64>,
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    pub fn from_report(query: &Query, report: Report) -> Self {
        Self {
            label: query.label().to_string(),
            kind: query.kind,
            range: query.range,
            rows: report.rows,
            totals: report.totals,
            row_count: report.row_count,
            error: None,
        }
    }

    pub fn failed(query: &Query, message: &str) -> Self {
        Self {
            label: query.label().to_string(),
            kind: query.kind,
            range: query.range,
            rows: Vec::new(),
            totals: Default::default(),
            row_count: 0,
            error: Some(message.to_string()),
        }
    }

    /// Total sessions, from totals or the row sum.
    pub fn total_sessions(&self) -> f64 {
        match self.totals.get("sessions") {
            Some(v) => *v,
            None => self.rows.iter().map(|r| r.metric("sessions")).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentData {
    Report(Report),
    Keywords(KeywordReport),
}

impl EnrichmentData {
    pub fn is_empty(&self) -> bool {
        match self {
            EnrichmentData::Report(r) => r.is_empty(),
            EnrichmentData::Keywords(k) => k.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodData {
    pub range: DateRange,
    pub data: EnrichmentData,
}

/// A fetched enrichment report. `previous` is present only when a compare
/// fetch was requested and succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub kind: QueryKind,
    pub range: DateRange,
    pub data: EnrichmentData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PeriodData>,
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySignal {
    /// Far above the mean session count.
    Spike,
    /// Majority of sessions with almost no engagement.
    DominantDisengaged,
    /// Near-zero engagement and duration.
    BotLike,
    HighBounce,
}

impl AnomalySignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalySignal::Spike => "spike",
            AnomalySignal::DominantDisengaged => "dominant+disengaged",
            AnomalySignal::BotLike => "bot-like",
            AnomalySignal::HighBounce => "high bounce",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub label: String,
    pub row_name: String,
    pub sessions: u64,
    pub share_percent: f64,
    pub signals: Vec<AnomalySignal>,
}

// ─── Request / reply ─────────────────────────────────────────────────────────

/// One chat turn as seen by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub request_id: String,
    pub user_id: String,
    pub target: AnalyticsTarget,
    pub message: String,
    pub history: Vec<InputMessage>,
    pub current_page: Option<CurrentPage>,
    pub section_context: Option<SectionContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub structured: ParsedResponse,
    pub intent: IntentDescriptor,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
