//! Context assembly for the final completion call.
//!
//! Blocks are emitted in a fixed order and absent blocks are omitted
//! entirely:
//!
//! 1. current page type
//! 2. target guardrail note
//! 3. section context
//! 4. page context
//! 5. analytics digest
//! 6. breakdown tables with anomaly summaries
//! 7. enrichment tables
//!
//! The model reads later blocks as elaboration of earlier ones, so the order
//! must not change.

use std::collections::BTreeSet;

use crate::analytics::{DateRange, KeywordReport, Report, Row};

use super::text::{format_number, percent, percent_change, truncate_utf8};
use super::types::{
    CurrentPage, EnrichmentData, EnrichmentResult, IntentDescriptor, PageType, QueryResult,
    SectionContext,
};

/// Rows rendered per table.
const MAX_TABLE_ROWS: usize = 20;

/// Cap on externally supplied section text.
const MAX_SECTION_BODY_BYTES: usize = 4000;

/// Reply contract shared by every chat request.
pub const BASE_INSTRUCTIONS: &str = "You are an analytics assistant for website owners. \
Answer the user's question about their website using the data provided below. \
Quote concrete numbers from the data when they support the answer and never invent numbers. \
Reply with a single JSON object and nothing else, in one of two shapes. \
For conversational replies: {\"type\":\"talk\",\"text\":\"...\"}. \
For analysis or recommendations: {\"type\":\"advice\",\"summary\":\"...\",\
\"sections\":[{\"title\":\"...\",\"items\":[\"...\"]}]}. \
Add \"support_notice\":true when a recommended action requires help from our staff.";

/// A breakdown result with its anomaly summary, if any.
#[derive(Debug, Clone)]
pub struct ScreenedResult {
    pub result: QueryResult,
    pub anomaly_summary: Option<String>,
}

/// Everything the assembler may draw on for one request.
#[derive(Debug, Clone, Copy)]
pub struct ContextInputs<'a> {
    pub page_type: PageType,
    pub intent: &'a IntentDescriptor,
    pub current_page: Option<&'a CurrentPage>,
    pub section: Option<&'a SectionContext>,
    pub digest: Option<&'a str>,
    pub flexible: &'a [ScreenedResult],
    pub enrichment: &'a [EnrichmentResult],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Full instruction text: the base instructions followed by every
    /// present block.
    pub fn assemble(&self, inputs: &ContextInputs<'_>) -> String {
        let mut parts = vec![BASE_INSTRUCTIONS.to_string()];
        parts.extend(self.blocks(inputs));
        parts.join("\n\n")
    }

    /// The ordered context blocks, without the base instructions.
    pub fn blocks(&self, inputs: &ContextInputs<'_>) -> Vec<String> {
        [
            Some(page_type_block(inputs.page_type)),
            guardrail_block(inputs.intent),
            inputs.section.and_then(section_block),
            page_block(inputs.intent, inputs.current_page),
            inputs.digest.and_then(digest_block),
            flexible_block(inputs.flexible),
            enrichment_block(inputs.enrichment),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

fn page_type_block(page_type: PageType) -> String {
    format!(
        "## Current page\nThe user is on {} (page type: {}).",
        page_type.description(),
        page_type.as_str()
    )
}

fn guardrail_block(intent: &IntentDescriptor) -> Option<String> {
    if !intent.guardrail_applied {
        return None;
    }
    Some(
        "## Target\nThe question is about the user's own website, not this report screen. \
Use the report data to evaluate the website; do not critique the report interface."
            .to_string(),
    )
}

fn section_block(section: &SectionContext) -> Option<String> {
    if section.section_title.trim().is_empty() && section.section_body.trim().is_empty() {
        return None;
    }
    let mut block = String::from("## Report section");
    if !section.section_type.trim().is_empty() {
        block.push_str(&format!(" ({})", section.section_type.trim()));
    }
    if !section.section_title.trim().is_empty() {
        block.push('\n');
        block.push_str(section.section_title.trim());
    }
    if !section.section_body.trim().is_empty() {
        block.push('\n');
        block.push_str(truncate_utf8(section.section_body.trim(), MAX_SECTION_BODY_BYTES));
    }
    Some(block)
}

fn page_block(intent: &IntentDescriptor, page: Option<&CurrentPage>) -> Option<String> {
    if !intent.needs_page {
        return None;
    }
    let page = page?;
    if page.url.trim().is_empty() {
        return None;
    }
    let mut block = format!("## Page context\nURL: {}", page.url.trim());
    if let Some(title) = page.title.as_deref().filter(|t| !t.trim().is_empty()) {
        block.push_str(&format!("\nTitle: {}", title.trim()));
    }
    Some(block)
}

fn digest_block(digest: &str) -> Option<String> {
    let digest = digest.trim();
    (!digest.is_empty()).then(|| format!("## Analytics overview\n{digest}"))
}

fn flexible_block(results: &[ScreenedResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let mut block = String::from("## Breakdown data");
    for screened in results {
        let result = &screened.result;
        block.push_str("\n\n");
        match &result.error {
            Some(message) => {
                block.push_str(&format!(
                    "### {} ({})\nData unavailable: {message}.",
                    result.label, result.range
                ));
            }
            None => {
                block.push_str(&render_table(
                    &result.label,
                    result.range,
                    &result.rows,
                    result.row_count,
                ));
            }
        }
        if let Some(summary) = &screened.anomaly_summary {
            block.push('\n');
            block.push_str(summary);
        }
    }
    Some(block)
}

fn enrichment_block(results: &[EnrichmentResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let mut block = String::from("## Additional data");
    for result in results {
        block.push_str("\n\n");
        let label = result.kind.label();
        match &result.data {
            EnrichmentData::Report(report) => {
                block.push_str(&render_table(label, result.range, &report.rows, report.row_count));
                if let Some(totals) = render_totals(report) {
                    block.push('\n');
                    block.push_str(&totals);
                }
            }
            EnrichmentData::Keywords(keywords) => {
                block.push_str(&render_keywords(label, result.range, keywords));
            }
        }
        if let Some(previous) = &result.previous {
            if let Some(line) = render_comparison(&result.data, &previous.data, previous.range) {
                block.push('\n');
                block.push_str(&line);
            }
        }
    }
    Some(block)
}

// ─── Rendering ───────────────────────────────────────────────────────────────

fn is_rate(metric: &str) -> bool {
    metric.ends_with("Rate") || metric == "ctr"
}

fn format_metric(metric: &str, value: f64) -> String {
    if is_rate(metric) {
        percent(value)
    } else {
        format_number(value)
    }
}

/// Pipe table of up to `MAX_TABLE_ROWS` rows.
pub fn render_table(label: &str, range: DateRange, rows: &[Row], row_count: u64) -> String {
    let mut out = format!("### {label} ({range})");
    if rows.is_empty() {
        out.push_str("\nNo data for this period.");
        return out;
    }

    let dimensions: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.dimensions.keys().map(String::as_str))
        .collect();
    let metrics: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.metrics.keys().map(String::as_str))
        .collect();

    let header: Vec<&str> = dimensions.iter().chain(metrics.iter()).copied().collect();
    out.push_str(&format!("\n| {} |", header.join(" | ")));
    out.push_str(&format!("\n|{}", "---|".repeat(header.len())));

    for row in rows.iter().take(MAX_TABLE_ROWS) {
        let cells: Vec<String> = dimensions
            .iter()
            .map(|d| match row.dimension(d) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => "(not set)".to_string(),
            })
            .chain(metrics.iter().map(|m| format_metric(m, row.metric(m))))
            .collect();
        out.push_str(&format!("\n| {} |", cells.join(" | ")));
    }

    let total_rows = (row_count as usize).max(rows.len());
    if total_rows > MAX_TABLE_ROWS {
        out.push_str(&format!(
            "\n({} of {total_rows} rows shown)",
            MAX_TABLE_ROWS.min(rows.len())
        ));
    }
    out
}

fn render_totals(report: &Report) -> Option<String> {
    if report.totals.is_empty() || report.rows.len() <= 1 {
        return None;
    }
    let parts: Vec<String> = report
        .totals
        .iter()
        .map(|(m, v)| format!("{m} {}", format_metric(m, *v)))
        .collect();
    Some(format!("Totals: {}", parts.join(", ")))
}

fn render_keywords(label: &str, range: DateRange, report: &KeywordReport) -> String {
    let mut out = format!(
        "### {label} ({range})\nTotal: {} impressions, {} clicks, CTR {}",
        format_number(report.total.impressions),
        format_number(report.total.clicks),
        percent(report.total.ctr)
    );
    if report.keywords.is_empty() {
        return out;
    }
    out.push_str("\n| query | clicks | impressions | ctr | position |\n|---|---|---|---|---|");
    for k in report.keywords.iter().take(MAX_TABLE_ROWS) {
        out.push_str(&format!(
            "\n| {} | {} | {} | {} | {:.1} |",
            k.query,
            format_number(k.clicks),
            format_number(k.impressions),
            percent(k.ctr),
            k.position
        ));
    }
    out
}

/// One line comparing headline numbers with the previous period.
fn render_comparison(
    current: &EnrichmentData,
    previous: &EnrichmentData,
    previous_range: DateRange,
) -> Option<String> {
    let pairs: Vec<(String, f64, f64)> = match (current, previous) {
        (EnrichmentData::Report(cur), EnrichmentData::Report(prev)) => {
            let metrics: BTreeSet<&str> = cur
                .totals
                .keys()
                .map(String::as_str)
                .chain(cur.rows.iter().flat_map(|r| r.metrics.keys().map(String::as_str)))
                .collect();
            metrics
                .into_iter()
                .map(|m| (m.to_string(), cur.total(m), prev.total(m)))
                .collect()
        }
        (EnrichmentData::Keywords(cur), EnrichmentData::Keywords(prev)) => vec![
            ("impressions".into(), cur.total.impressions, prev.total.impressions),
            ("clicks".into(), cur.total.clicks, prev.total.clicks),
        ],
        _ => return None,
    };

    let parts: Vec<String> = pairs
        .iter()
        .filter(|(m, _, _)| !is_rate(m))
        .map(|(m, cur, prev)| {
            let change = percent_change(*cur, *prev)
                .map(|c| format!(" ({c})"))
                .unwrap_or_default();
            format!("{m} {} → {}{change}", format_number(*prev), format_number(*cur))
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!(
        "Compared with previous period ({previous_range}): {}",
        parts.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_core::test_support::report_with_rows;
    use crate::chat_core::types::{Intent, PeriodData, Query, QueryKind, Target};
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
        )
    }

    fn intent(guardrail: bool, needs_page: bool) -> IntentDescriptor {
        IntentDescriptor {
            intent: Intent::SiteImprovement,
            target: Target::ClientSite,
            needs_page,
            needs_analytics: true,
            guardrail_applied: guardrail,
        }
    }

    fn country_query() -> Query {
        Query {
            kind: QueryKind::Country,
            dimensions: vec!["country".into()],
            metrics: vec!["sessions".into()],
            range: range(),
            limit: 20,
            compare: false,
        }
    }

    #[test]
    fn test_all_blocks_in_order() {
        let intent = intent(true, true);
        let page = CurrentPage {
            url: "https://app.example.com/dashboard".into(),
            title: Some("Dashboard".into()),
        };
        let section = SectionContext {
            section_type: "kpi".into(),
            section_title: "Sessions".into(),
            section_body: "Sessions fell 12%".into(),
        };
        let flexible = vec![ScreenedResult {
            result: QueryResult::from_report(
                &country_query(),
                report_with_rows("country", &[("Japan", 120.0)]),
            ),
            anomaly_summary: Some("Possible anomalies in Sessions by country: X".into()),
        }];
        let enrichment = vec![EnrichmentResult {
            kind: QueryKind::Pages,
            range: range(),
            data: EnrichmentData::Report(report_with_rows("pagePath", &[("/pricing", 80.0)])),
            previous: Some(PeriodData {
                range: range().previous_period(),
                data: EnrichmentData::Report(report_with_rows("pagePath", &[("/pricing", 100.0)])),
            }),
        }];

        let inputs = ContextInputs {
            page_type: PageType::ReportDashboard,
            intent: &intent,
            current_page: Some(&page),
            section: Some(&section),
            digest: Some("Analytics digest: sessions 400"),
            flexible: &flexible,
            enrichment: &enrichment,
        };
        let text = ContextAssembler::new().assemble(&inputs);

        let markers = [
            "## Current page",
            "## Target",
            "## Report section (kpi)",
            "## Page context",
            "## Analytics overview",
            "## Breakdown data",
            "## Additional data",
        ];
        let positions: Vec<usize> = markers.iter().map(|m| text.find(m).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(text.starts_with(BASE_INSTRUCTIONS));
        assert!(text.contains("| Japan | 60.0% | 120 |"));
        assert!(text.contains("Possible anomalies in Sessions by country"));
        assert!(text.contains("sessions 100 → 80 (-20.0%)"));
    }

    #[test]
    fn test_absent_blocks_are_omitted() {
        let intent = intent(false, false);
        let inputs = ContextInputs {
            page_type: PageType::Chat,
            intent: &intent,
            current_page: Some(&CurrentPage {
                url: "/chat".into(),
                title: None,
            }),
            section: None,
            digest: Some("   "),
            flexible: &[],
            enrichment: &[],
        };
        let blocks = ContextAssembler::new().blocks(&inputs);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("page type: chat"));
    }

    #[test]
    fn test_failed_breakdown_shows_category_message() {
        let intent = intent(false, false);
        let flexible = vec![ScreenedResult {
            result: QueryResult::failed(&country_query(), "analytics is not connected"),
            anomaly_summary: None,
        }];
        let inputs = ContextInputs {
            page_type: PageType::Other,
            intent: &intent,
            current_page: None,
            section: None,
            digest: None,
            flexible: &flexible,
            enrichment: &[],
        };
        let text = ContextAssembler::new().assemble(&inputs);
        assert!(text.contains("Data unavailable: analytics is not connected."));
    }

    #[test]
    fn test_table_caps_rows() {
        let rows: Vec<(String, f64)> = (0..30).map(|i| (format!("c{i}"), i as f64)).collect();
        let borrowed: Vec<(&str, f64)> = rows.iter().map(|(n, s)| (n.as_str(), *s)).collect();
        let report = report_with_rows("region", &borrowed);
        let table = render_table("Regions", range(), &report.rows, report.row_count);
        assert_eq!(table.lines().filter(|l| l.starts_with("| c")).count(), MAX_TABLE_ROWS);
        assert!(table.ends_with("(20 of 30 rows shown)"));
    }
}
