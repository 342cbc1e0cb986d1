//! Sanitisation of planner-proposed enrichment queries.
//!
//! The planner's output is untrusted: unknown types are dropped, duplicates
//! collapse to the first occurrence, and every date window is forced into
//! `floor <= start <= end <= today` with a bounded span.

use std::collections::HashSet;

use chrono::{Duration, Months, NaiveDate};
use serde_json::Value;

use crate::analytics::DateRange;

use super::types::{Query, QueryKind};

/// Longest window a single query may cover, counting both ends.
pub const MAX_SPAN_DAYS: i64 = 92;

/// How far back a query may reach.
const LOOKBACK_MONTHS: u32 = 24;

#[derive(Debug, Clone)]
pub struct QueryValidator {
    today: NaiveDate,
    max_queries: usize,
}

impl QueryValidator {
    pub fn new(today: NaiveDate, max_queries: usize) -> Self {
        Self { today, max_queries }
    }

    /// Earliest date any query may start on.
    pub fn floor(&self) -> NaiveDate {
        self.today
            .checked_sub_months(Months::new(LOOKBACK_MONTHS))
            .unwrap_or(self.today - Duration::days(730))
    }

    /// Validate a raw proposal list. Never fails; bad entries are dropped.
    pub fn validate(&self, proposed: &[Value]) -> Vec<Query> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for item in proposed {
            if out.len() >= self.max_queries {
                break;
            }

            let raw_type = item.get("type").and_then(Value::as_str).unwrap_or("");
            let Some(kind) = QueryKind::parse_enrichment(raw_type) else {
                tracing::debug!(query_type = raw_type, "dropping unknown query type");
                continue;
            };
            if !seen.insert(kind) {
                tracing::debug!(query_type = kind.as_str(), "dropping duplicate query type");
                continue;
            }

            let range = self.normalize_range(
                item.get("start").and_then(Value::as_str),
                item.get("end").and_then(Value::as_str),
            );
            let compare = item.get("compare").and_then(Value::as_bool).unwrap_or(false);

            out.push(Query {
                kind,
                dimensions: Vec::new(),
                metrics: Vec::new(),
                range,
                limit: 0,
                compare,
            });
        }

        out
    }

    /// Force a proposed window into the allowed bounds.
    pub fn normalize_range(&self, start: Option<&str>, end: Option<&str>) -> DateRange {
        let (start, end) = match (start.and_then(parse_date), end.and_then(parse_date)) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                let window = DateRange::default_window(self.today);
                (window.start, window.end)
            }
        };

        let (mut start, mut end) = if start > end { (end, start) } else { (start, end) };

        end = end.min(self.today);
        start = start.min(end);

        if (end - start).num_days() + 1 > MAX_SPAN_DAYS {
            start = end - Duration::days(MAX_SPAN_DAYS - 1);
        }

        let floor = self.floor();
        start = start.max(floor);
        if end < floor {
            end = floor;
        }

        DateRange { start, end }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
