use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::{Block, Rule};
use crate::parser::normalize::normalize_date;
use crate::record::Format;

static RELEASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Released|Available)\s+([A-Za-z]+\s+\d{1,2},?\s+\d{4})").unwrap()
});
static SPINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").unwrap());
static FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Blu-ray|DVD|4K|Collector['’]s Set").unwrap()
});
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\s?\d{1,4}(?:\.\d{2})?").unwrap());

pub const DATE_RULES: &[Rule<NaiveDate>] = &[from_release_line];
pub const SPINE_RULES: &[Rule<String>] = &[from_spine_marker];
pub const FORMAT_RULES: &[Rule<Format>] = &[from_format_token];
pub const PRICE_RULES: &[Rule<String>] = &[from_price_tag];

/// "Released March 5, 2024" / "Available April 1, 2025" anywhere in the block.
pub fn from_release_line(block: &Block<'_>) -> Option<NaiveDate> {
    let caps = RELEASE_RE.captures(&block.text)?;
    normalize_date(caps.get(2)?.as_str())
}

/// Catalog (spine) number written as `#123`.
pub fn from_spine_marker(block: &Block<'_>) -> Option<String> {
    Some(SPINE_RE.captures(&block.text)?.get(1)?.as_str().to_string())
}

pub fn from_format_token(block: &Block<'_>) -> Option<Format> {
    let token = FORMAT_RE.find(&block.text)?.as_str();
    match token {
        "Blu-ray" => Some(Format::BluRay),
        "DVD" => Some(Format::Dvd),
        "4K" => Some(Format::UltraHd),
        _ => Some(Format::CollectorsSet),
    }
}

pub fn from_price_tag(block: &Block<'_>) -> Option<String> {
    let raw = PRICE_RE.find(&block.text)?.as_str();
    Some(raw.split_whitespace().collect())
}
