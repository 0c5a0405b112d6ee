use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Node, Selector};

use super::{collapse, Block, Rule};

static TEXT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p, div, span").unwrap());
static NAME_START_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][a-z]+ [A-Z]").unwrap());
static DISQUALIFY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d|Released|Available|Quick").unwrap());

pub const RULES: &[Rule<String>] = &[from_name_line];

/// First short text element that reads like "Firstname Lastname".
///
/// Only elements whose whole content is a single string are looked at, so a
/// wrapper around several lines never counts as a name.
pub fn from_name_line(block: &Block<'_>) -> Option<String> {
    block
        .el
        .select(&TEXT_SEL)
        .filter_map(sole_string)
        .map(|s| collapse(&s))
        .find(|text| looks_like_name(text))
}

fn looks_like_name(text: &str) -> bool {
    let words = text.split_whitespace().count();
    NAME_START_RE.is_match(text) && (2..=4).contains(&words) && !DISQUALIFY_RE.is_match(text)
}

/// The text of an element that has exactly one child, following chains of
/// single-child wrappers down to a text node.
fn sole_string(el: ElementRef<'_>) -> Option<String> {
    let mut children = el.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match only.value() {
        Node::Text(text) => Some(String::from(&**text)),
        Node::Element(_) => sole_string(ElementRef::wrap(only)?),
        _ => None,
    }
}
