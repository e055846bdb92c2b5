//! Date recognition and normalization to the canonical `YYYY-MM-DD` form.

use chrono::NaiveDate;

use super::patterns::{DATE_DAY_MONTH_NAME, DATE_DMY, DATE_MONTH_NAME_DAY, DATE_YMD, DUE_DATE};
use super::{ExtractionMatch, FieldExtractor};
use crate::script::normalize_digits;

/// Canonical date format shared by every stage downstream of extraction.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Date field extractor.
pub struct DateExtractor;

impl DateExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for DateExtractor {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let text = normalize_digits(text);
        let mut results: Vec<Self::Output> = Vec::new();

        // YYYY-MM-DD first: it is unambiguous
        for caps in DATE_YMD.captures_iter(&text) {
            let year: i32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);
            if let (Some(date), Some(m)) = (NaiveDate::from_ymd_opt(year, month, day), caps.get(0)) {
                results.push(ExtractionMatch::new(date, m.as_str()).with_position(m.start(), m.end()));
            }
        }

        // DD/MM/YYYY, DD.MM.YYYY, DD-MM-YYYY (day first, as on Arabic and European invoices)
        for caps in DATE_DMY.captures_iter(&text) {
            let day: u32 = caps[1].parse().unwrap_or(0);
            let month: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);
            push_unique(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        for caps in DATE_DAY_MONTH_NAME.captures_iter(&text) {
            let day: u32 = caps[1].parse().unwrap_or(0);
            let month = month_from_name(&caps[2]);
            let year: i32 = caps[3].parse().unwrap_or(0);
            push_unique(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        for caps in DATE_MONTH_NAME_DAY.captures_iter(&text) {
            let month = month_from_name(&caps[1]);
            let day: u32 = caps[2].parse().unwrap_or(0);
            let year: i32 = caps[3].parse().unwrap_or(0);
            push_unique(&mut results, NaiveDate::from_ymd_opt(year, month, day), caps.get(0));
        }

        results.sort_by_key(|r| r.position.map(|(start, _)| start).unwrap_or(usize::MAX));
        results
    }
}

fn push_unique(
    results: &mut Vec<ExtractionMatch<NaiveDate>>,
    date: Option<NaiveDate>,
    m: Option<regex::Match<'_>>,
) {
    let (Some(date), Some(m)) = (date, m) else {
        return;
    };
    // Skip spans already claimed by an earlier pattern
    let overlaps = results.iter().any(|r| {
        r.position
            .is_some_and(|(start, end)| m.start() < end && start < m.end())
    });
    if !overlaps {
        results.push(ExtractionMatch::new(date, m.as_str()).with_position(m.start(), m.end()));
    }
}

/// Parse a value that should be a date and nothing else.
///
/// Returns `None` when the string holds anything besides one recognizable date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let normalized = normalize_digits(value);
    let trimmed = normalized.trim().trim_end_matches(['.', ',']);
    if trimmed.is_empty() {
        return None;
    }

    let found = DateExtractor::new().extract(trimmed)?;
    (found.source.len() == trimmed.len()).then_some(found.value)
}

/// Render a date in the canonical format.
pub fn format_date(date: NaiveDate) -> String {
    date.format(CANONICAL_DATE_FORMAT).to_string()
}

/// Find the labeled payment due date in free invoice text.
pub fn find_due_date(text: &str) -> Option<ExtractionMatch<NaiveDate>> {
    let text = normalize_digits(text);
    let extractor = DateExtractor::new();

    // "Amount Due: 120.00" also matches the label, so keep looking
    DUE_DATE
        .captures_iter(&text)
        .find_map(|caps| extractor.extract(&caps[1]))
}

fn month_from_name(name: &str) -> u32 {
    let lower = name.to_lowercase();
    let english = match lower.as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => 0,
    };
    if english != 0 {
        return english;
    }

    match name {
        "يناير" => 1,
        "فبراير" => 2,
        "مارس" => 3,
        "أبريل" | "ابريل" | "إبريل" => 4,
        "مايو" => 5,
        "يونيو" => 6,
        "يوليو" => 7,
        "أغسطس" | "اغسطس" => 8,
        "سبتمبر" => 9,
        "أكتوبر" | "اكتوبر" => 10,
        "نوفمبر" => 11,
        "ديسمبر" => 12,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_date("2024-05-01"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_date(" 2024/05/01 "), Some(ymd(2024, 5, 1)));
    }

    #[test]
    fn test_parse_day_first_date() {
        assert_eq!(parse_date("01/05/2024"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_date("15.01.2024"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn test_parse_month_names() {
        assert_eq!(parse_date("1 May 2024"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_date("May 1, 2024"), Some(ymd(2024, 5, 1)));
        assert_eq!(parse_date("15 مارس 2024"), Some(ymd(2024, 3, 15)));
    }

    #[test]
    fn test_parse_arabic_indic_digits() {
        assert_eq!(parse_date("٢٠٢٤-٠٥-٠١"), Some(ymd(2024, 5, 1)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date("2024-13-45"), None);
        assert_eq!(parse_date("due 2024-05-01 or later"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_format_is_canonical() {
        assert_eq!(format_date(ymd(2024, 5, 1)), "2024-05-01");
    }

    #[test]
    fn test_find_due_date_skips_amount_due() {
        let text = "Amount Due: 120.00\nDue Date: 01/06/2024\n";
        let found = find_due_date(text).unwrap();
        assert_eq!(found.value, ymd(2024, 6, 1));
    }

    #[test]
    fn test_find_arabic_due_date() {
        let text = "فاتورة\nتاريخ الاستحقاق: ٢٠٢٤/٠٥/٠١\n";
        assert_eq!(find_due_date(text).map(|m| m.value), Some(ymd(2024, 5, 1)));
    }
}
