//! GA4 Data API client (`properties/{id}:runReport`).
//!
//! The canned reports are fixed dimension/metric sets run through the same
//! `run_report` call as flexible queries.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::errors::ProviderError;
use super::provider::{AnalyticsProvider, ProviderResult};
use super::types::{DateRange, Report, Row};
use crate::config::AnalyticsConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct CannedReport {
    dimensions: &'static [&'static str],
    metrics: &'static [&'static str],
    limit: u32,
}

const SUMMARY: CannedReport = CannedReport {
    dimensions: &[],
    metrics: &[
        "sessions",
        "activeUsers",
        "newUsers",
        "screenPageViews",
        "engagementRate",
        "bounceRate",
        "averageSessionDuration",
        "keyEvents",
    ],
    limit: 1,
};

const DAILY: CannedReport = CannedReport {
    dimensions: &["date"],
    metrics: &["sessions", "activeUsers", "screenPageViews", "keyEvents"],
    limit: 100,
};

const PAGES: CannedReport = CannedReport {
    dimensions: &["pagePath"],
    metrics: &[
        "screenPageViews",
        "sessions",
        "engagementRate",
        "averageSessionDuration",
    ],
    limit: 20,
};

const DEVICES: CannedReport = CannedReport {
    dimensions: &["deviceCategory"],
    metrics: &[
        "sessions",
        "activeUsers",
        "engagementRate",
        "bounceRate",
        "keyEvents",
    ],
    limit: 10,
};

const DEVICE_DAILY: CannedReport = CannedReport {
    dimensions: &["date", "deviceCategory"],
    metrics: &["sessions"],
    limit: 400,
};

const SOURCES: CannedReport = CannedReport {
    dimensions: &["sessionSourceMedium"],
    metrics: &["sessions", "activeUsers", "engagementRate", "keyEvents"],
    limit: 20,
};

const REGIONS: CannedReport = CannedReport {
    dimensions: &["region"],
    metrics: &["sessions", "activeUsers", "engagementRate"],
    limit: 20,
};

// ─── Wire Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    date_ranges: Vec<WireDateRange>,
    dimensions: Vec<NameRef>,
    metrics: Vec<NameRef>,
    limit: u32,
    metric_aggregations: Vec<&'static str>,
    order_bys: Vec<OrderBy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireDateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct NameRef {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderBy {
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<MetricOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<DimensionOrder>,
    desc: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricOrder {
    metric_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DimensionOrder {
    dimension_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RunReportResponse {
    dimension_headers: Vec<NameRef>,
    metric_headers: Vec<NameRef>,
    rows: Vec<WireRow>,
    totals: Vec<WireRow>,
    row_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireRow {
    dimension_values: Vec<WireValue>,
    metric_values: Vec<WireValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireValue {
    value: String,
}

// ─── Ga4Client ───────────────────────────────────────────────────────────────

/// GA4 Data API client authenticated with a bearer token.
pub struct Ga4Client {
    http: HttpClient,
    base_url: String,
    access_token: Option<String>,
    timeout_secs: u64,
}

impl Ga4Client {
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, ProviderError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network {
                endpoint: config.ga4_base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.ga4_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn run_canned(
        &self,
        property_id: &str,
        range: DateRange,
        report: &CannedReport,
    ) -> ProviderResult<Report> {
        let dimensions: Vec<String> = report.dimensions.iter().map(|s| s.to_string()).collect();
        let metrics: Vec<String> = report.metrics.iter().map(|s| s.to_string()).collect();
        self.run_report(property_id, range, &dimensions, &metrics, report.limit)
            .await
    }

    async fn run_report(
        &self,
        property_id: &str,
        range: DateRange,
        dimensions: &[String],
        metrics: &[String],
        limit: u32,
    ) -> ProviderResult<Report> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                reason: "no analytics access token".into(),
            })?;
        if property_id.is_empty() {
            return Err(ProviderError::NotConfigured {
                reason: "no GA4 property id".into(),
            });
        }

        let url = format!("{}/properties/{property_id}:runReport", self.base_url);
        let body = build_request(range, dimensions, metrics, limit);

        tracing::debug!(
            property_id,
            range = %range,
            dimensions = ?dimensions,
            metric_count = metrics.len(),
            limit,
            "GA4 runReport"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&url, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body_text));
        }

        let parsed: RunReportResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&url, e, self.timeout_secs))?;

        Ok(convert_response(parsed))
    }
}

#[async_trait]
impl AnalyticsProvider for Ga4Client {
    async fn fetch_summary(&self, property_id: &str, range: DateRange) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &SUMMARY).await
    }

    async fn fetch_daily_series(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &DAILY).await
    }

    async fn fetch_page_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &PAGES).await
    }

    async fn fetch_device_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &DEVICES).await
    }

    async fn fetch_device_daily_series(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &DEVICE_DAILY).await
    }

    async fn fetch_source_breakdown(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &SOURCES).await
    }

    async fn fetch_region_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report> {
        self.run_canned(property_id, range, &REGIONS).await
    }

    async fn fetch_flexible_report(
        &self,
        property_id: &str,
        range: DateRange,
        dimensions: &[String],
        metrics: &[String],
        limit: u32,
    ) -> ProviderResult<Report> {
        self.run_report(property_id, range, dimensions, metrics, limit)
            .await
    }
}

// ─── Request / Response Mapping ──────────────────────────────────────────────

/// Date-keyed reports are ordered chronologically, everything else by the
/// first metric descending.
fn build_request(
    range: DateRange,
    dimensions: &[String],
    metrics: &[String],
    limit: u32,
) -> RunReportRequest {
    let order_by = if dimensions.iter().any(|d| d == "date") {
        OrderBy {
            metric: None,
            dimension: Some(DimensionOrder {
                dimension_name: "date".into(),
            }),
            desc: false,
        }
    } else {
        OrderBy {
            metric: metrics.first().map(|m| MetricOrder {
                metric_name: m.clone(),
            }),
            dimension: None,
            desc: true,
        }
    };

    RunReportRequest {
        date_ranges: vec![WireDateRange {
            start_date: range.start_str(),
            end_date: range.end_str(),
        }],
        dimensions: dimensions
            .iter()
            .map(|d| NameRef { name: d.clone() })
            .collect(),
        metrics: metrics.iter().map(|m| NameRef { name: m.clone() }).collect(),
        limit,
        metric_aggregations: vec!["TOTAL"],
        order_bys: if order_by.metric.is_some() || order_by.dimension.is_some() {
            vec![order_by]
        } else {
            Vec::new()
        },
    }
}

fn convert_response(resp: RunReportResponse) -> Report {
    let dim_names: Vec<&str> = resp.dimension_headers.iter().map(|h| h.name.as_str()).collect();
    let metric_names: Vec<&str> = resp.metric_headers.iter().map(|h| h.name.as_str()).collect();

    let rows: Vec<Row> = resp
        .rows
        .iter()
        .map(|r| convert_row(r, &dim_names, &metric_names))
        .collect();

    let totals: BTreeMap<String, f64> = resp
        .totals
        .first()
        .map(|t| convert_row(t, &dim_names, &metric_names).metrics)
        .unwrap_or_default();

    Report {
        row_count: resp.row_count.unwrap_or(rows.len() as u64),
        rows,
        totals,
    }
}

fn convert_row(row: &WireRow, dim_names: &[&str], metric_names: &[&str]) -> Row {
    let dimensions = dim_names
        .iter()
        .zip(&row.dimension_values)
        .map(|(name, v)| (name.to_string(), v.value.clone()))
        .collect();
    // GA4 encodes every metric value as a string.
    let metrics = metric_names
        .iter()
        .zip(&row.metric_values)
        .map(|(name, v)| (name.to_string(), v.value.parse::<f64>().unwrap_or(0.0)))
        .collect();
    Row {
        dimensions,
        metrics,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
