//! Baseline analytics digest: the last 28 days at a glance.
//!
//! Built from three canned reports fetched through the executor (summary
//! with previous-period compare, top sources, top pages), rendered to text
//! and cached per user.

use std::time::Duration;

use chrono::NaiveDate;

use crate::analytics::cache::{get_json, put_json};
use crate::analytics::{cache_key, AnalyticsTarget, DateRange, Report};

use super::executor::QueryExecutor;
use super::text::{format_number, percent, percent_change};
use super::types::{EnrichmentData, EnrichmentResult, Query, QueryKind};

/// Cache key type for the rendered digest.
const DIGEST_KEY: &str = "digest";

/// Entries listed per top-N section.
const TOP_N: usize = 5;

/// Summary metrics shown in the digest, with their display names. Rates are
/// shown as percentages.
const SUMMARY_METRICS: &[(&str, &str, bool)] = &[
    ("sessions", "Sessions", false),
    ("activeUsers", "Active users", false),
    ("newUsers", "New users", false),
    ("screenPageViews", "Page views", false),
    ("engagementRate", "Engagement rate", true),
    ("bounceRate", "Bounce rate", true),
    ("averageSessionDuration", "Avg. session duration (s)", false),
    ("keyEvents", "Key events", false),
];

pub struct DigestBuilder {
    ttl: Duration,
}

impl DigestBuilder {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Cached or freshly built digest. `None` when no analytics data could
    /// be fetched.
    pub async fn build(
        &self,
        executor: &QueryExecutor,
        user_id: &str,
        target: &AnalyticsTarget,
        today: NaiveDate,
    ) -> Option<String> {
        let window = DateRange::default_window(today);
        let key = cache_key(user_id, DIGEST_KEY, window, None);

        if let Some(digest) = get_json::<String>(executor.cache(), &key).await {
            tracing::debug!(user_id, "digest cache hit");
            return Some(digest);
        }

        let queries = [
            digest_query(QueryKind::Summary, window, true),
            digest_query(QueryKind::Sources, window, false),
            digest_query(QueryKind::Pages, window, false),
        ];
        let results = executor.run_enrichment(user_id, target, &queries).await;
        let digest = render_digest(window, &results)?;

        put_json(executor.cache(), &key, &digest, self.ttl).await;
        tracing::info!(user_id, chars = digest.chars().count(), "digest built");
        Some(digest)
    }
}

fn digest_query(kind: QueryKind, range: DateRange, compare: bool) -> Query {
    Query {
        kind,
        dimensions: Vec::new(),
        metrics: Vec::new(),
        range,
        limit: 0,
        compare,
    }
}

fn report_of(result: &EnrichmentResult) -> Option<&Report> {
    match &result.data {
        EnrichmentData::Report(r) => Some(r),
        EnrichmentData::Keywords(_) => None,
    }
}

/// Render the digest text, or `None` when every section is empty.
pub fn render_digest(window: DateRange, results: &[EnrichmentResult]) -> Option<String> {
    let mut lines = Vec::new();

    let find = |kind: QueryKind| results.iter().find(|r| r.kind == kind);

    if let Some(summary) = find(QueryKind::Summary) {
        if let Some(report) = report_of(summary) {
            let previous = summary.previous.as_ref().and_then(|p| match &p.data {
                EnrichmentData::Report(r) => Some(r),
                EnrichmentData::Keywords(_) => None,
            });
            for (metric, name, is_rate) in SUMMARY_METRICS {
                let present = report.totals.contains_key(*metric)
                    || report.rows.iter().any(|r| r.metrics.contains_key(*metric));
                if !present {
                    continue;
                }
                let value = report.total(metric);
                let shown = if *is_rate {
                    percent(value)
                } else {
                    format_number(value)
                };
                let change = previous
                    .and_then(|p| percent_change(value, p.total(metric)))
                    .map(|c| format!(" ({c} vs previous period)"))
                    .unwrap_or_default();
                lines.push(format!("- {name}: {shown}{change}"));
            }
        }
    }

    for (kind, heading) in [
        (QueryKind::Sources, "Top sources"),
        (QueryKind::Pages, "Top pages"),
    ] {
        let Some(report) = find(kind).and_then(report_of) else {
            continue;
        };
        let entries: Vec<String> = report
            .rows
            .iter()
            .take(TOP_N)
            .map(|row| {
                let value = if kind == QueryKind::Pages {
                    row.metric("screenPageViews").max(row.metric("sessions"))
                } else {
                    row.metric("sessions")
                };
                format!("{} ({})", row.label(), format_number(value))
            })
            .collect();
        if !entries.is_empty() {
            lines.push(format!("- {heading}: {}", entries.join(", ")));
        }
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("Analytics digest ({window}):\n{}", lines.join("\n")))
}
