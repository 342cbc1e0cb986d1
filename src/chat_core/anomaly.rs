//! Outlier and spam screening over breakdown results.
//!
//! Only country, city and source / medium breakdowns are screened. Each row
//! is checked against the configured thresholds; rows with at least one
//! signal become findings, and a single summary line per result is handed to
//! the context assembler.

use crate::config::AnomalyThresholds;

use super::text::{format_number, percent};
use super::types::{AnomalyFinding, AnomalySignal, QueryResult};

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    thresholds: AnomalyThresholds,
}

impl AnomalyDetector {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    /// Rows of one result that trip any signal.
    pub fn detect(&self, result: &QueryResult) -> Vec<AnomalyFinding> {
        if !result.kind.is_anomaly_screened() || result.rows.is_empty() {
            return Vec::new();
        }

        let t = &self.thresholds;
        let row_sum: f64 = result.rows.iter().map(|r| r.metric("sessions")).sum();
        if row_sum <= 0.0 {
            return Vec::new();
        }
        let mean = row_sum / result.rows.len() as f64;
        // Rows are capped by the query limit; shares are against the report total.
        let total = result.total_sessions().max(row_sum);

        result
            .rows
            .iter()
            .filter_map(|row| {
                let sessions = row.metric("sessions");
                let engagement = row.metric("engagementRate");
                let bounce = row.metric("bounceRate");
                let duration = row.metric("averageSessionDuration");
                let share = sessions / total;

                let mut signals = Vec::new();
                if sessions >= mean * t.spike_multiplier && sessions >= t.spike_min_sessions {
                    signals.push(AnomalySignal::Spike);
                }
                if share > t.dominant_share && engagement < t.dominant_max_engagement {
                    signals.push(AnomalySignal::DominantDisengaged);
                }
                if engagement < t.bot_max_engagement
                    && duration < t.bot_max_duration_secs
                    && sessions >= t.bot_min_sessions
                {
                    signals.push(AnomalySignal::BotLike);
                }
                if bounce > t.high_bounce_rate && sessions >= t.high_bounce_min_sessions {
                    signals.push(AnomalySignal::HighBounce);
                }

                if signals.is_empty() {
                    return None;
                }
                Some(AnomalyFinding {
                    label: result.label.clone(),
                    row_name: row.label(),
                    sessions: sessions.round() as u64,
                    share_percent: (share * 1000.0).round() / 10.0,
                    signals,
                })
            })
            .collect()
    }

    /// One line describing every finding of a result, or `None` when clean.
    pub fn summarize(&self, result: &QueryResult) -> Option<String> {
        let findings = self.detect(result);
        if findings.is_empty() {
            return None;
        }

        tracing::info!(
            query = %result.label,
            findings = findings.len(),
            "anomalies detected"
        );

        let parts: Vec<String> = findings
            .iter()
            .map(|f| {
                let signals: Vec<&str> = f.signals.iter().map(|s| s.as_str()).collect();
                format!(
                    "{} ({} sessions, {} of total: {})",
                    f.row_name,
                    format_number(f.sessions as f64),
                    percent(f.share_percent / 100.0),
                    signals.join(", ")
                )
            })
            .collect();

        Some(format!(
            "Possible anomalies in {}: {}",
            result.label,
            parts.join("; ")
        ))
    }
}
