//! UTF-8 safe text helpers shared by the pipeline stages.

/// Approximate characters per token for mixed prose.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Truncate to at most `max_bytes`, backing off to a char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Truncate to at most `max_chars` characters.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Rough token estimate, used only for logging context size.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as f64 / CHARS_PER_TOKEN).ceil() as u32
}

/// Format a fraction as a percentage with one decimal, e.g. `0.4213` → `42.1%`.
pub(crate) fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

/// Signed percentage change from `previous` to `current`, or `None` when the
/// previous value is zero.
pub(crate) fn percent_change(current: f64, previous: f64) -> Option<String> {
    if previous == 0.0 {
        return None;
    }
    let change = (current - previous) / previous * 100.0;
    Some(format!("{change:+.1}%"))
}

/// Format a metric value: integers without decimals, everything else with two.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}
