//! Shared analytics data types: date ranges, report rows and keyword reports.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

// ─── DateRange ───────────────────────────────────────────────────────────────

/// Length of the default analysis window, in days (inclusive).
pub const DEFAULT_WINDOW_DAYS: i64 = 28;

/// An inclusive calendar date range. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping the bounds if they are reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The last `days` days ending on (and including) `today`.
    pub fn last_days(today: NaiveDate, days: i64) -> Self {
        Self {
            start: today - Duration::days(days.max(1) - 1),
            end: today,
        }
    }

    /// The default window: last 28 days ending today.
    pub fn default_window(today: NaiveDate) -> Self {
        Self::last_days(today, DEFAULT_WINDOW_DAYS)
    }

    /// Number of days covered, counting both ends.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The immediately preceding period of equal length.
    pub fn previous_period(&self) -> Self {
        let end = self.start - Duration::days(1);
        Self {
            start: end - Duration::days(self.span_days() - 1),
            end,
        }
    }

    /// GA4 / Search Console date format.
    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start_str(), self.end_str())
    }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// One report row: dimension values plus numeric metric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub dimensions: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

impl Row {
    /// Metric value, or 0 when the row does not carry it.
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).map(String::as_str)
    }

    /// Human label for the row: dimension values joined with " / ".
    pub fn label(&self) -> String {
        if self.dimensions.is_empty() {
            return "(total)".to_string();
        }
        self.dimensions
            .values()
            .map(|v| if v.is_empty() { "(not set)" } else { v.as_str() })
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// A tabular report as returned by `runReport`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub rows: Vec<Row>,
    pub totals: BTreeMap<String, f64>,
    pub row_count: u64,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.totals.is_empty()
    }

    /// Total for a metric, falling back to the sum over rows when the
    /// provider returned no totals.
    pub fn total(&self, metric: &str) -> f64 {
        match self.totals.get(metric) {
            Some(v) => *v,
            None => self.rows.iter().map(|r| r.metric(metric)).sum(),
        }
    }
}

/// Search Console totals for a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordTotals {
    pub impressions: f64,
    pub clicks: f64,
    pub ctr: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordRow {
    pub query: String,
    pub impressions: f64,
    pub clicks: f64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordReport {
    pub total: KeywordTotals,
    pub keywords: Vec<KeywordRow>,
}

impl KeywordReport {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.total.impressions == 0.0
    }
}

/// Which GA4 property / Search Console site a request reads from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyticsTarget {
    pub property_id: Option<String>,
    pub site_url: Option<String>,
}

impl AnalyticsTarget {
    pub fn has_property(&self) -> bool {
        self.property_id.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_site(&self) -> bool {
        self.site_url.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// True when at least one analytics source is configured.
    pub fn is_configured(&self) -> bool {
        self.has_property() || self.has_site()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
