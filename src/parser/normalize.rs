use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// Where a date may hide in free text, most specific first.
static DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Released\s+([A-Za-z]+\s+\d{1,2},?\s+\d{4})",
        r"(?i)Available\s+([A-Za-z]+\s+\d{1,2},?\s+\d{4})",
        r"(?i)([A-Za-z]+\s+\d{1,2},?\s+\d{4})",
        r"(\d{1,2}/\d{1,2}/\d{4})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Calendar layouts tried on an extracted date substring, in order.
const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%m/%d/%Y", "%B %d %Y"];

/// Turn listing text like "Released March 5, 2024" into a calendar date.
///
/// A pattern whose substring fits none of the formats hands over to the next
/// pattern. Nothing usable anywhere gives `None`; this never fails a record.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    if raw.trim().is_empty() {
        return None;
    }

    DATE_PATTERNS.iter().find_map(|re| {
        let candidate = re.captures(raw)?.get(1)?.as_str();
        parse_calendar(candidate)
    })
}

fn parse_calendar(text: &str) -> Option<NaiveDate> {
    let text = collapse_whitespace(text);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn released_prefix_and_slash_form_agree() {
        let a = normalize_date("Released March 5, 2024");
        assert_eq!(a, ymd(2024, 3, 5));
        assert_eq!(a, normalize_date("3/5/2024"));
    }

    #[test]
    fn available_prefix() {
        assert_eq!(normalize_date("Available April 1, 2025"), ymd(2025, 4, 1));
    }

    #[test]
    fn abbreviated_month_and_missing_comma() {
        assert_eq!(normalize_date("Sep 9, 2023"), ymd(2023, 9, 9));
        assert_eq!(normalize_date("December 12 2023"), ymd(2023, 12, 12));
    }

    #[test]
    fn embedded_in_surrounding_text() {
        assert_eq!(
            normalize_date("Blu-ray #1234 released january 16, 2024 $39.95"),
            ymd(2024, 1, 16)
        );
    }

    #[test]
    fn unparseable_prefix_falls_through_to_later_pattern() {
        // "Released Soon 1, 2024" matches the first pattern but is no date
        assert_eq!(
            normalize_date("Released Soon 1, 2024 (ships 6/30/2024)"),
            ymd(2024, 6, 30)
        );
    }

    #[test]
    fn impossible_dates_and_noise_are_absent() {
        assert_eq!(normalize_date("February 30, 2024"), None);
        assert_eq!(normalize_date("Coming soon"), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("13/45/2024"), None);
    }
}
