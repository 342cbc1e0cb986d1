//! Query execution through the cache.
//!
//! Every query kind is dispatched through a handler table built once at
//! construction. Results are read from and written to the cache; empty
//! payloads are never cached. Provider failures never propagate: flexible
//! queries carry a category message, enrichment queries are skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};

use crate::analytics::cache::{get_json, put_json};
use crate::analytics::{
    cache_key, AnalyticsProvider, AnalyticsTarget, Cache, DateRange, KeywordProvider,
    ProviderError, ProviderResult,
};
use crate::config::CacheConfig;

use super::types::{EnrichmentData, EnrichmentResult, PeriodData, Query, QueryKind, QueryResult};

/// Upper bound on a single provider fetch.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

// ─── Handler table ───────────────────────────────────────────────────────────

struct Sources {
    analytics: Arc<dyn AnalyticsProvider>,
    keywords: Arc<dyn KeywordProvider>,
}

type FetchFuture<'a> = BoxFuture<'a, ProviderResult<EnrichmentData>>;

type FetchHandler =
    for<'a> fn(&'a Sources, &'a AnalyticsTarget, &'a Query, DateRange) -> FetchFuture<'a>;

fn property_id(target: &AnalyticsTarget) -> ProviderResult<&str> {
    target
        .property_id
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ProviderError::NotConfigured {
            reason: "no GA4 property connected".into(),
        })
}

macro_rules! canned_handler {
    ($name:ident, $method:ident) => {
        fn $name<'a>(
            sources: &'a Sources,
            target: &'a AnalyticsTarget,
            _query: &'a Query,
            range: DateRange,
        ) -> FetchFuture<'a> {
            Box::pin(async move {
                let property_id = property_id(target)?;
                sources
                    .analytics
                    .$method(property_id, range)
                    .await
                    .map(EnrichmentData::Report)
            })
        }
    };
}

canned_handler!(fetch_summary, fetch_summary);
canned_handler!(fetch_daily, fetch_daily_series);
canned_handler!(fetch_pages, fetch_page_details);
canned_handler!(fetch_devices, fetch_device_details);
canned_handler!(fetch_device_daily, fetch_device_daily_series);
canned_handler!(fetch_sources, fetch_source_breakdown);
canned_handler!(fetch_regions, fetch_region_details);

fn fetch_flexible<'a>(
    sources: &'a Sources,
    target: &'a AnalyticsTarget,
    query: &'a Query,
    range: DateRange,
) -> FetchFuture<'a> {
    Box::pin(async move {
        let property_id = property_id(target)?;
        sources
            .analytics
            .fetch_flexible_report(
                property_id,
                range,
                &query.dimensions,
                &query.metrics,
                query.limit,
            )
            .await
            .map(EnrichmentData::Report)
    })
}

fn fetch_keywords<'a>(
    sources: &'a Sources,
    target: &'a AnalyticsTarget,
    _query: &'a Query,
    range: DateRange,
) -> FetchFuture<'a> {
    Box::pin(async move {
        let site_url = target
            .site_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured {
                reason: "no Search Console site connected".into(),
            })?;
        sources
            .keywords
            .fetch_keyword_data(site_url, range)
            .await
            .map(EnrichmentData::Keywords)
    })
}

fn handler_table() -> HashMap<QueryKind, FetchHandler> {
    let mut table: HashMap<QueryKind, FetchHandler> = HashMap::new();
    table.insert(QueryKind::Country, fetch_flexible);
    table.insert(QueryKind::City, fetch_flexible);
    table.insert(QueryKind::SourceMedium, fetch_flexible);
    table.insert(QueryKind::LandingPage, fetch_flexible);
    table.insert(QueryKind::Summary, fetch_summary);
    table.insert(QueryKind::Daily, fetch_daily);
    table.insert(QueryKind::Pages, fetch_pages);
    table.insert(QueryKind::Devices, fetch_devices);
    table.insert(QueryKind::DeviceDaily, fetch_device_daily);
    table.insert(QueryKind::Sources, fetch_sources);
    table.insert(QueryKind::Regions, fetch_regions);
    table.insert(QueryKind::Keywords, fetch_keywords);
    table
}

// ─── QueryExecutor ───────────────────────────────────────────────────────────

pub struct QueryExecutor {
    sources: Sources,
    cache: Arc<dyn Cache>,
    handlers: HashMap<QueryKind, FetchHandler>,
    flexible_ttl: Duration,
    enrichment_ttl: Duration,
    fetch_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(
        analytics: Arc<dyn AnalyticsProvider>,
        keywords: Arc<dyn KeywordProvider>,
        cache: Arc<dyn Cache>,
        cache_config: &CacheConfig,
    ) -> Self {
        Self {
            sources: Sources {
                analytics,
                keywords,
            },
            cache,
            handlers: handler_table(),
            flexible_ttl: Duration::from_secs(cache_config.flexible_ttl_secs),
            enrichment_ttl: Duration::from_secs(cache_config.enrichment_ttl_secs),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    /// Run deterministic breakdown queries concurrently. One result per
    /// query, in input order.
    pub async fn run_flexible(
        &self,
        user_id: &str,
        target: &AnalyticsTarget,
        queries: &[Query],
    ) -> Vec<QueryResult> {
        join_all(
            queries
                .iter()
                .map(|q| self.execute_flexible(user_id, target, q)),
        )
        .await
    }

    /// Run enrichment queries concurrently. Failed or empty queries are
    /// dropped; order of the survivors follows the input.
    pub async fn run_enrichment(
        &self,
        user_id: &str,
        target: &AnalyticsTarget,
        queries: &[Query],
    ) -> Vec<EnrichmentResult> {
        join_all(
            queries
                .iter()
                .map(|q| self.execute_enrichment(user_id, target, q)),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    pub async fn execute_flexible(
        &self,
        user_id: &str,
        target: &AnalyticsTarget,
        query: &Query,
    ) -> QueryResult {
        match self
            .fetch_cached(user_id, target, query, query.range, self.flexible_ttl)
            .await
        {
            Ok(EnrichmentData::Report(report)) => QueryResult::from_report(query, report),
            Ok(EnrichmentData::Keywords(_)) => {
                let err = ProviderError::InvalidResponse {
                    reason: "keyword payload for a breakdown query".into(),
                };
                QueryResult::failed(query, err.category_message())
            }
            Err(e) => {
                tracing::warn!(
                    query_type = query.kind.as_str(),
                    range = %query.range,
                    error = %e,
                    "flexible query failed"
                );
                QueryResult::failed(query, e.category_message())
            }
        }
    }

    /// Fetch one enrichment query, plus its previous period when `compare`
    /// is set. A failed comparison never discards the primary result.
    pub async fn execute_enrichment(
        &self,
        user_id: &str,
        target: &AnalyticsTarget,
        query: &Query,
    ) -> Option<EnrichmentResult> {
        let previous_range = query.range.previous_period();
        let primary = self.fetch_cached(user_id, target, query, query.range, self.enrichment_ttl);
        let previous = async {
            if query.compare {
                Some(
                    self.fetch_cached(user_id, target, query, previous_range, self.enrichment_ttl)
                        .await,
                )
            } else {
                None
            }
        };
        let (primary, previous) = tokio::join!(primary, previous);

        let data = match primary {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                tracing::debug!(query_type = query.kind.as_str(), "enrichment query empty");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    query_type = query.kind.as_str(),
                    range = %query.range,
                    error = %e,
                    "enrichment query skipped"
                );
                return None;
            }
        };

        let previous = match previous {
            Some(Ok(data)) if !data.is_empty() => Some(PeriodData {
                range: previous_range,
                data,
            }),
            Some(Err(e)) => {
                tracing::warn!(
                    query_type = query.kind.as_str(),
                    range = %previous_range,
                    error = %e,
                    "comparison fetch failed, keeping primary result"
                );
                None
            }
            _ => None,
        };

        Some(EnrichmentResult {
            kind: query.kind,
            range: query.range,
            data,
            previous,
        })
    }

    async fn fetch_cached(
        &self,
        user_id: &str,
        target: &AnalyticsTarget,
        query: &Query,
        range: DateRange,
        ttl: Duration,
    ) -> ProviderResult<EnrichmentData> {
        let dimensions = (!query.dimensions.is_empty()).then_some(query.dimensions.as_slice());
        let key = cache_key(user_id, query.kind.as_str(), range, dimensions);

        if let Some(data) = get_json::<EnrichmentData>(self.cache.as_ref(), &key).await {
            tracing::debug!(query_type = query.kind.as_str(), range = %range, "cache hit");
            return Ok(data);
        }
        tracing::debug!(query_type = query.kind.as_str(), range = %range, "cache miss");

        let handler = self
            .handlers
            .get(&query.kind)
            .ok_or_else(|| ProviderError::NotConfigured {
                reason: format!("no handler for {}", query.kind.as_str()),
            })?;

        let data = tokio::time::timeout(self.fetch_timeout, handler(&self.sources, target, query, range))
            .await
            .map_err(|_| ProviderError::Timeout {
                duration_secs: self.fetch_timeout.as_secs(),
            })??;

        if !data.is_empty() {
            put_json(self.cache.as_ref(), &key, &data, ttl).await;
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MemoryCache;
    use crate::chat_core::test_support::{
        report_with_rows, target, FailingCache, FakeAnalytics, FakeKeywords,
    };
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        )
    }

    fn enrichment(kind: QueryKind, compare: bool) -> Query {
        Query {
            kind,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            range: range(),
            limit: 0,
            compare,
        }
    }

    fn breakdown() -> Query {
        Query {
            kind: QueryKind::Country,
            dimensions: vec!["country".into()],
            metrics: vec!["sessions".into()],
            range: range(),
            limit: 20,
            compare: false,
        }
    }

    fn executor(analytics: Arc<FakeAnalytics>, cache: Arc<dyn Cache>) -> QueryExecutor {
        QueryExecutor::new(
            analytics,
            Arc::new(FakeKeywords::default()),
            cache,
            &CacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_second_run_hits_cache() {
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "country",
            &[("Japan", 120.0)],
        )));
        let exec = executor(analytics.clone(), Arc::new(MemoryCache::new()));

        let first = exec.execute_flexible("u1", &target(), &breakdown()).await;
        let second = exec.execute_flexible("u1", &target(), &breakdown()).await;

        assert_eq!(first, second);
        assert_eq!(first.rows.len(), 1);
        assert!(first.error.is_none());
        assert_eq!(analytics.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let analytics = Arc::new(FakeAnalytics::default());
        let cache = Arc::new(MemoryCache::new());
        let exec = executor(analytics.clone(), cache.clone());

        exec.execute_flexible("u1", &target(), &breakdown()).await;
        exec.execute_flexible("u1", &target(), &breakdown()).await;

        assert_eq!(analytics.calls().len(), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_flexible_failure_carries_category_message() {
        let analytics = Arc::new(FakeAnalytics::failing());
        let exec = executor(analytics, Arc::new(MemoryCache::new()));

        let result = exec.execute_flexible("u1", &target(), &breakdown()).await;
        assert!(result.rows.is_empty());
        assert_eq!(
            result.error.as_deref(),
            Some("no permission to read this analytics property")
        );
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_skipped() {
        let analytics = Arc::new(FakeAnalytics::failing());
        let exec = executor(analytics, Arc::new(MemoryCache::new()));

        let results = exec
            .run_enrichment(
                "u1",
                &target(),
                &[enrichment(QueryKind::Summary, false), enrichment(QueryKind::Pages, false)],
            )
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_compare_fetches_previous_period() {
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "pagePath",
            &[("/pricing", 40.0)],
        )));
        let exec = executor(analytics.clone(), Arc::new(MemoryCache::new()));

        let result = exec
            .execute_enrichment("u1", &target(), &enrichment(QueryKind::Pages, true))
            .await
            .unwrap();

        let previous = result.previous.unwrap();
        assert_eq!(previous.range, range().previous_period());
        assert_eq!(analytics.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_compare_failure_keeps_primary() {
        let analytics = Arc::new(
            FakeAnalytics::with_report(report_with_rows("date", &[("20260901", 10.0)]))
                .failing_for(range().previous_period()),
        );
        let exec = executor(analytics, Arc::new(MemoryCache::new()));

        let result = exec
            .execute_enrichment("u1", &target(), &enrichment(QueryKind::Daily, true))
            .await
            .unwrap();
        assert_eq!(result.range, range());
        assert!(result.previous.is_none());
    }

    #[tokio::test]
    async fn test_missing_property_is_not_configured() {
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "country",
            &[("Japan", 1.0)],
        )));
        let exec = executor(analytics.clone(), Arc::new(MemoryCache::new()));

        let result = exec
            .execute_flexible("u1", &AnalyticsTarget::default(), &breakdown())
            .await;
        assert_eq!(result.error.as_deref(), Some("analytics is not connected"));
        assert!(analytics.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_errors_degrade_to_miss() {
        let analytics = Arc::new(FakeAnalytics::with_report(report_with_rows(
            "country",
            &[("Japan", 5.0)],
        )));
        let exec = executor(analytics.clone(), Arc::new(FailingCache));

        let result = exec.execute_flexible("u1", &target(), &breakdown()).await;
        assert_eq!(result.rows.len(), 1);
        assert_eq!(analytics.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_keywords_dispatch() {
        let exec = executor(Arc::new(FakeAnalytics::default()), Arc::new(MemoryCache::new()));
        let result = exec
            .execute_enrichment("u1", &target(), &enrichment(QueryKind::Keywords, false))
            .await
            .unwrap();
        assert!(matches!(result.data, EnrichmentData::Keywords(_)));
    }

    #[test]
    fn test_every_kind_has_a_handler() {
        let table = handler_table();
        for kind in QueryKind::ENRICHMENT {
            assert!(table.contains_key(&kind), "{}", kind.as_str());
        }
        for kind in [
            QueryKind::Country,
            QueryKind::City,
            QueryKind::SourceMedium,
            QueryKind::LandingPage,
        ] {
            assert!(table.contains_key(&kind));
        }
    }
}
