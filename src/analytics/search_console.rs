//! Search Console `searchAnalytics/query` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::errors::ProviderError;
use super::provider::{KeywordProvider, ProviderResult};
use super::types::{DateRange, KeywordReport, KeywordRow, KeywordTotals};
use crate::config::AnalyticsConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Top queries returned per request.
const KEYWORD_ROW_LIMIT: u32 = 25;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    start_date: String,
    end_date: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<&'static str>,
    row_limit: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueryResponse {
    rows: Vec<WireRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRow {
    keys: Vec<String>,
    clicks: f64,
    impressions: f64,
    ctr: f64,
    position: f64,
}

/// Search Console client authenticated with a bearer token.
pub struct SearchConsoleClient {
    http: HttpClient,
    base_url: String,
    access_token: Option<String>,
    timeout_secs: u64,
}

impl SearchConsoleClient {
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, ProviderError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network {
                endpoint: config.search_console_base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.search_console_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build `{base}/sites/{site}/searchAnalytics/query` with the site URL
    /// percent-encoded as a single path segment.
    fn query_url(&self, site_url: &str) -> ProviderResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            ProviderError::NotConfigured {
                reason: format!("invalid search console base url: {e}"),
            }
        })?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::NotConfigured {
                reason: "search console base url cannot carry a path".into(),
            })?
            .push("sites")
            .push(site_url)
            .push("searchAnalytics")
            .push("query");
        Ok(url)
    }

    async fn query(
        &self,
        token: &str,
        url: &reqwest::Url,
        body: &QueryRequest,
    ) -> ProviderResult<QueryResponse> {
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(url.as_str(), e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(url.as_str(), e, self.timeout_secs))
    }
}

#[async_trait]
impl KeywordProvider for SearchConsoleClient {
    async fn fetch_keyword_data(
        &self,
        site_url: &str,
        range: DateRange,
    ) -> ProviderResult<KeywordReport> {
        let token = self
            .access_token
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                reason: "no search console access token".into(),
            })?;
        if site_url.is_empty() {
            return Err(ProviderError::NotConfigured {
                reason: "no search console site url".into(),
            });
        }

        let url = self.query_url(site_url)?;
        let by_query = QueryRequest {
            start_date: range.start_str(),
            end_date: range.end_str(),
            dimensions: vec!["query"],
            row_limit: KEYWORD_ROW_LIMIT,
        };
        // Without dimensions the API returns a single aggregate row.
        let aggregate = QueryRequest {
            start_date: range.start_str(),
            end_date: range.end_str(),
            dimensions: Vec::new(),
            row_limit: 1,
        };

        tracing::debug!(site_url, range = %range, "search console query");

        let (keywords, totals) = tokio::try_join!(
            self.query(token, &url, &by_query),
            self.query(token, &url, &aggregate)
        )?;

        Ok(convert(keywords, totals))
    }
}

fn convert(keywords: QueryResponse, totals: QueryResponse) -> KeywordReport {
    let total = totals
        .rows
        .first()
        .map(|r| KeywordTotals {
            impressions: r.impressions,
            clicks: r.clicks,
            ctr: r.ctr,
        })
        .unwrap_or_default();

    let keywords = keywords
        .rows
        .into_iter()
        .filter_map(|r| {
            let query = r.keys.into_iter().next()?;
            Some(KeywordRow {
                query,
                impressions: r.impressions,
                clicks: r.clicks,
                ctr: r.ctr,
                position: r.position,
            })
        })
        .collect();

    KeywordReport { total, keywords }
}
