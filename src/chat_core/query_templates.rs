//! Deterministic query templates.
//!
//! Maps breakdown keywords straight to flexible GA4 queries without asking a
//! language model. Each template has a constant dimension / metric / limit
//! set; the date window comes from the message.

use crate::analytics::DateRange;

use super::keywords::{KeywordCategory, KeywordHits};
use super::types::{Query, QueryKind};

/// Row limit for every breakdown template.
const BREAKDOWN_LIMIT: u32 = 20;

const BREAKDOWN_METRICS: &[&str] = &[
    "sessions",
    "activeUsers",
    "engagementRate",
    "bounceRate",
    "averageSessionDuration",
    "keyEvents",
];

struct QueryTemplate {
    kind: QueryKind,
    trigger: KeywordCategory,
    dimension: &'static str,
}

/// Most specific first. The where-from fallback only fires when none matched.
const TEMPLATES: &[QueryTemplate] = &[
    QueryTemplate {
        kind: QueryKind::Country,
        trigger: KeywordCategory::Country,
        dimension: "country",
    },
    QueryTemplate {
        kind: QueryKind::City,
        trigger: KeywordCategory::City,
        dimension: "city",
    },
    QueryTemplate {
        kind: QueryKind::SourceMedium,
        trigger: KeywordCategory::Source,
        dimension: "sessionSourceMedium",
    },
    QueryTemplate {
        kind: QueryKind::LandingPage,
        trigger: KeywordCategory::LandingPage,
        dimension: "landingPage",
    },
];

const WHERE_FROM_KINDS: &[QueryKind] = &[QueryKind::Country, QueryKind::SourceMedium];

#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicQueryBuilder;

impl DeterministicQueryBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the breakdown queries the keyword hits call for.
    pub fn build(&self, hits: &KeywordHits, range: DateRange) -> Vec<Query> {
        let matched: Vec<Query> = TEMPLATES
            .iter()
            .filter(|t| hits.has(t.trigger))
            .map(|t| template_query(t, range))
            .collect();

        if !matched.is_empty() || !hits.has(KeywordCategory::WhereFrom) {
            return matched;
        }

        WHERE_FROM_KINDS
            .iter()
            .filter_map(|kind| TEMPLATES.iter().find(|t| t.kind == *kind))
            .map(|t| template_query(t, range))
            .collect()
    }
}

fn template_query(template: &QueryTemplate, range: DateRange) -> Query {
    Query {
        kind: template.kind,
        dimensions: vec![template.dimension.to_string()],
        metrics: BREAKDOWN_METRICS.iter().map(|m| m.to_string()).collect(),
        range,
        limit: BREAKDOWN_LIMIT,
        compare: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_core::keywords::KeywordClassifier;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::default_window(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap())
    }

    fn kinds(text: &str) -> Vec<QueryKind> {
        let hits = KeywordClassifier::new().classify(text);
        DeterministicQueryBuilder::new()
            .build(&hits, range())
            .into_iter()
            .map(|q| q.kind)
            .collect()
    }

    #[test]
    fn test_country_template() {
        let hits = KeywordClassifier::new().classify("国別のセッション数");
        let queries = DeterministicQueryBuilder::new().build(&hits, range());
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].kind, QueryKind::Country);
        assert_eq!(queries[0].dimensions, vec!["country".to_string()]);
        assert!(queries[0].metrics.contains(&"bounceRate".to_string()));
        assert_eq!(queries[0].limit, BREAKDOWN_LIMIT);
        assert_eq!(queries[0].range, range());
    }

    #[test]
    fn test_multiple_templates() {
        assert_eq!(
            kinds("traffic by city and by landing page"),
            vec![QueryKind::City, QueryKind::LandingPage]
        );
    }

    #[test]
    fn test_where_from_fallback() {
        assert_eq!(
            kinds("Where did my visitors come from?"),
            vec![QueryKind::Country, QueryKind::SourceMedium]
        );
    }

    #[test]
    fn test_specific_template_suppresses_where_from() {
        assert_eq!(
            kinds("Which cities did visitors come from?"),
            vec![QueryKind::City]
        );
    }

    #[test]
    fn test_no_breakdown_keywords() {
        assert!(kinds("Why did visits drop in September?").is_empty());
    }
}
