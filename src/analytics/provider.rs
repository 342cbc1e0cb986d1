//! Provider contracts consumed by the chat pipeline.
//!
//! The pipeline only depends on these traits. `Ga4Client` and
//! `SearchConsoleClient` are the production implementations; tests use
//! in-memory fakes.

use async_trait::async_trait;

use super::errors::ProviderError;
use super::types::{DateRange, KeywordReport, Report};

pub type ProviderResult<T> = Result<T, ProviderError>;

/// GA4-style analytics source.
///
/// Every method may return an empty report. Callers treat empty and error
/// alike as "no data".
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    /// Property-level totals for the window (no dimensions).
    async fn fetch_summary(&self, property_id: &str, range: DateRange) -> ProviderResult<Report>;

    /// One row per day.
    async fn fetch_daily_series(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// Top pages by views.
    async fn fetch_page_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// Breakdown by device category.
    async fn fetch_device_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// One row per (day, device category).
    async fn fetch_device_daily_series(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// Breakdown by session source / medium.
    async fn fetch_source_breakdown(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// Breakdown by region.
    async fn fetch_region_details(
        &self,
        property_id: &str,
        range: DateRange,
    ) -> ProviderResult<Report>;

    /// Ad-hoc report over arbitrary dimensions and metrics.
    async fn fetch_flexible_report(
        &self,
        property_id: &str,
        range: DateRange,
        dimensions: &[String],
        metrics: &[String],
        limit: u32,
    ) -> ProviderResult<Report>;
}

/// Search-keyword source (Search Console).
#[async_trait]
pub trait KeywordProvider: Send + Sync {
    async fn fetch_keyword_data(
        &self,
        site_url: &str,
        range: DateRange,
    ) -> ProviderResult<KeywordReport>;
}
