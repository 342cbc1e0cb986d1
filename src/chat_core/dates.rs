//! Free-text date range extraction.
//!
//! Rules are evaluated in a fixed order and the first match wins. Overlapping
//! phrasings are resolved only by that order, so it must not change:
//!
//! 1. year-month-day (`2026-09-05`, `2026年9月5日`, `2026/9/5`); two such dates
//!    form a range
//! 2. month-day without year (`9月5日`, `September 5`)
//! 3. slash month/day (`9/5`)
//! 4. year-month (`2026年9月`, `2026-09`, `September 2026`)
//! 5. month only (`9月`, `September`)
//! 6. relative terms (last month, this month, yesterday, last week)
//! 7. default: last 28 days ending today
//!
//! Dates without a year take the current year, or the previous one when that
//! would lie in the future. The result always satisfies
//! `start <= end <= today`.

use chrono::{Datelike, Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::analytics::DateRange;

const MONTH_NAMES: &str = "january|february|march|april|may|june|july|august|september|october|november|december|sept|jan|feb|mar|apr|jun|jul|aug|sep|oct|nov|dec";

lazy_static! {
    static ref YMD_RE: Regex = Regex::new(
        r"(\d{4})\s*[-/年.]\s*(\d{1,2})\s*[-/月.]\s*(\d{1,2})\s*日?"
    )
    .unwrap();
    static ref MD_JA_RE: Regex = Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap();
    static ref MD_EN_RE: Regex = Regex::new(&format!(
        r"\b({MONTH_NAMES})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b"
    ))
    .unwrap();
    static ref SLASH_MD_RE: Regex = Regex::new(r"(?:^|[^\d/])(\d{1,2})/(\d{1,2})(?:[^\d/]|$)").unwrap();
    static ref YM_RE: Regex = Regex::new(r"(\d{4})\s*[-/年.]\s*(\d{1,2})(?:\s*月)?").unwrap();
    static ref YM_EN_RE: Regex =
        Regex::new(&format!(r"\b({MONTH_NAMES})\.?,?\s+(\d{{4}})\b")).unwrap();
    static ref MONTH_JA_RE: Regex = Regex::new(r"(\d{1,2})\s*月").unwrap();
    static ref MONTH_EN_RE: Regex = Regex::new(&format!(r"\b({MONTH_NAMES})\b")).unwrap();
}

/// Extracts a concrete date range from a user message relative to `today`.
#[derive(Debug, Clone, Copy)]
pub struct DateRangeExtractor {
    today: NaiveDate,
}

impl DateRangeExtractor {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Extract the range, falling back to the last 28 days.
    pub fn extract(&self, text: &str) -> DateRange {
        let range = self
            .match_rules(text)
            .unwrap_or_else(|| DateRange::default_window(self.today));
        self.clamp(range)
    }

    /// True when the text names a period explicitly (any rule but the default).
    pub fn has_explicit_period(&self, text: &str) -> bool {
        self.match_rules(text).is_some()
    }

    fn clamp(&self, range: DateRange) -> DateRange {
        let end = range.end.min(self.today);
        let start = range.start.min(end);
        DateRange { start, end }
    }

    fn match_rules(&self, text: &str) -> Option<DateRange> {
        let text = normalize(text);

        self.year_month_day(&text)
            .or_else(|| self.month_day(&text))
            .or_else(|| self.slash_month_day(&text))
            .or_else(|| self.year_month(&text))
            .or_else(|| self.month_only(&text))
            .or_else(|| self.relative(&text))
    }

    // ─── Rules ───────────────────────────────────────────────────────────

    fn year_month_day(&self, text: &str) -> Option<DateRange> {
        let dates: Vec<NaiveDate> = YMD_RE
            .captures_iter(text)
            .filter_map(|c| {
                NaiveDate::from_ymd_opt(num(&c, 1)? as i32, num(&c, 2)?, num(&c, 3)?)
            })
            .take(2)
            .collect();
        match dates.as_slice() {
            [single] => Some(DateRange::single_day(*single)),
            [first, second] => Some(DateRange::new(*first, *second)),
            _ => None,
        }
    }

    fn month_day(&self, text: &str) -> Option<DateRange> {
        if let Some(c) = MD_JA_RE.captures(text) {
            if let Some(day) = self.infer_year(num(&c, 1)?, num(&c, 2)?) {
                return Some(DateRange::single_day(day));
            }
        }
        let c = MD_EN_RE.captures(text)?;
        let month = month_from_name(c.get(1)?.as_str())?;
        let day = self.infer_year(month, num(&c, 2)?)?;
        Some(DateRange::single_day(day))
    }

    fn slash_month_day(&self, text: &str) -> Option<DateRange> {
        let c = SLASH_MD_RE.captures(text)?;
        let day = self.infer_year(num(&c, 1)?, num(&c, 2)?)?;
        Some(DateRange::single_day(day))
    }

    fn year_month(&self, text: &str) -> Option<DateRange> {
        let (year, month) = match YM_RE.captures(text) {
            Some(c) => (num(&c, 1)? as i32, num(&c, 2)?),
            None => {
                let c = YM_EN_RE.captures(text)?;
                (num(&c, 2)? as i32, month_from_name(c.get(1)?.as_str())?)
            }
        };
        month_range(year, month)
    }

    fn month_only(&self, text: &str) -> Option<DateRange> {
        let month = match MONTH_JA_RE.captures(text) {
            Some(c) => num(&c, 1)?,
            None => MONTH_EN_RE
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                // Bare "may" is far more often the modal verb.
                .filter(|m| m.as_str() != "may")
                .find_map(|m| month_from_name(m.as_str()))?,
        };

        let this_year = month_range(self.today.year(), month)?;
        if this_year.end > self.today {
            month_range(self.today.year() - 1, month)
        } else {
            Some(this_year)
        }
    }

    fn relative(&self, text: &str) -> Option<DateRange> {
        let today = self.today;
        if text.contains("先月") || text.contains("last month") || text.contains("前月") {
            let first_this = first_of_month(today)?;
            let last_prev = first_this - Duration::days(1);
            return Some(DateRange::new(first_of_month(last_prev)?, last_prev));
        }
        if text.contains("今月") || text.contains("this month") {
            return Some(DateRange::new(first_of_month(today)?, today));
        }
        if text.contains("昨日") || text.contains("yesterday") {
            return Some(DateRange::single_day(today - Duration::days(1)));
        }
        if text.contains("先週") || text.contains("last week") {
            let days_since_monday = i64::from(today.weekday().num_days_from_monday());
            let this_monday = today - Duration::days(days_since_monday);
            let last_monday = this_monday - Duration::days(7);
            return Some(DateRange::new(last_monday, this_monday - Duration::days(1)));
        }
        None
    }

    /// Month/day in the current year, or last year when that is in the future.
    fn infer_year(&self, month: u32, day: u32) -> Option<NaiveDate> {
        let candidate = NaiveDate::from_ymd_opt(self.today.year(), month, day);
        match candidate {
            Some(date) if date <= self.today => Some(date),
            _ => NaiveDate::from_ymd_opt(self.today.year() - 1, month, day),
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Lowercase and fold full-width digits and separators to ASCII.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '／' => '/',
            '－' => '-',
            '．' => '.',
            _ => c,
        })
        .collect::<String>()
        .to_lowercase()
}

fn num(c: &Captures<'_>, idx: usize) -> Option<u32> {
    c.get(idx)?.as_str().parse().ok()
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// The whole calendar month.
fn month_range(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange::new(start, next - Duration::days(1)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn extract(text: &str, today: NaiveDate) -> DateRange {
        DateRangeExtractor::new(today).extract(text)
    }

    #[test]
    fn test_month_day_current_year() {
        let r = extract("1月15日のアクセスは？", d(2026, 2, 1));
        assert_eq!(r, DateRange::single_day(d(2026, 1, 15)));
    }

    #[test]
    fn test_month_day_rolls_back_when_future() {
        let r = extract("1月15日", d(2026, 1, 1));
        assert_eq!(r, DateRange::single_day(d(2025, 1, 15)));
    }

    #[test]
    fn test_explicit_ymd() {
        let today = d(2026, 10, 19);
        assert_eq!(
            extract("2026-09-05 sessions", today),
            DateRange::single_day(d(2026, 9, 5))
        );
        assert_eq!(
            extract("2025年12月3日の流入", today),
            DateRange::single_day(d(2025, 12, 3))
        );
    }

    #[test]
    fn test_two_ymd_dates_form_range() {
        let r = extract("2026/09/01〜2026/09/15", d(2026, 10, 19));
        assert_eq!(r, DateRange::new(d(2026, 9, 1), d(2026, 9, 15)));
    }

    #[test]
    fn test_full_width_digits() {
        let r = extract("２０２６年９月５日", d(2026, 10, 19));
        assert_eq!(r, DateRange::single_day(d(2026, 9, 5)));
    }

    #[test]
    fn test_english_month_day() {
        let r = extract("What happened on September 5th?", d(2026, 10, 19));
        assert_eq!(r, DateRange::single_day(d(2026, 9, 5)));
    }

    #[test]
    fn test_slash_month_day() {
        let r = extract("traffic on 12/24", d(2026, 10, 19));
        assert_eq!(r, DateRange::single_day(d(2025, 12, 24)));
    }

    #[test]
    fn test_year_month_clamped_to_today() {
        let r = extract("2026年10月の状況", d(2026, 10, 19));
        assert_eq!(r, DateRange::new(d(2026, 10, 1), d(2026, 10, 19)));
    }

    #[test]
    fn test_english_year_month() {
        let r = extract("compare september 2025", d(2026, 10, 19));
        assert_eq!(r, DateRange::new(d(2025, 9, 1), d(2025, 9, 30)));
    }

    #[test]
    fn test_month_only() {
        let today = d(2026, 10, 19);
        assert_eq!(
            extract("Why did visits drop in September?", today),
            DateRange::new(d(2026, 9, 1), d(2026, 9, 30))
        );
        assert_eq!(
            extract("9月はどうだった？", today),
            DateRange::new(d(2026, 9, 1), d(2026, 9, 30))
        );
    }

    #[test]
    fn test_month_only_unfinished_month_uses_prior_year() {
        let r = extract("how was october", d(2026, 10, 19));
        assert_eq!(r, DateRange::new(d(2025, 10, 1), d(2025, 10, 31)));
        let r = extract("12月の売上", d(2026, 10, 19));
        assert_eq!(r, DateRange::new(d(2025, 12, 1), d(2025, 12, 31)));
    }

    #[test]
    fn test_bare_may_is_not_a_month() {
        let today = d(2026, 10, 19);
        assert_eq!(
            extract("This may be caused by bots", today),
            DateRange::default_window(today)
        );
        assert_eq!(
            extract("sessions in may 2026", today),
            DateRange::new(d(2026, 5, 1), d(2026, 5, 31))
        );
    }

    #[test]
    fn test_relative_terms() {
        let today = d(2026, 10, 19); // Monday
        assert_eq!(
            extract("先月の訪問数", today),
            DateRange::new(d(2026, 9, 1), d(2026, 9, 30))
        );
        assert_eq!(
            extract("this month so far", today),
            DateRange::new(d(2026, 10, 1), d(2026, 10, 19))
        );
        assert_eq!(
            extract("昨日のセッション", today),
            DateRange::single_day(d(2026, 10, 18))
        );
        assert_eq!(
            extract("last week", today),
            DateRange::new(d(2026, 10, 12), d(2026, 10, 18))
        );
    }

    #[test]
    fn test_last_month_in_january_crosses_year() {
        let r = extract("last month", d(2026, 1, 10));
        assert_eq!(r, DateRange::new(d(2025, 12, 1), d(2025, 12, 31)));
    }

    #[test]
    fn test_default_window() {
        let today = d(2026, 10, 19);
        let r = extract("how is my site doing?", today);
        assert_eq!(r, DateRange::new(d(2026, 9, 22), today));
        assert!(!DateRangeExtractor::new(today).has_explicit_period("how is my site doing?"));
    }

    #[test]
    fn test_future_explicit_date_clamped() {
        let today = d(2026, 10, 19);
        let r = extract("2027-01-01", today);
        assert_eq!(r, DateRange::single_day(today));
    }

    #[test]
    fn test_ymd_wins_over_month_only() {
        let r = extract("2026年3月3日 vs March", d(2026, 10, 19));
        assert_eq!(r, DateRange::single_day(d(2026, 3, 3)));
    }

    #[test]
    fn test_invalid_day_falls_through() {
        let today = d(2026, 10, 19);
        // 2月30日 is not a date; "2月" then matches month-only.
        let r = extract("2月30日", today);
        assert_eq!(r, DateRange::new(d(2026, 2, 1), d(2026, 2, 28)));
    }
}
