use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static CONTAINER_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div, article").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static ITEM_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"product|item|film").unwrap());
pub static ITEM_HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/films/|/shop/product/").unwrap());

/// How a candidate block was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A container whose class names an item.
    ClassMatch,
    /// The parent of an item link, when no container matched by class.
    AnchorParent,
}

/// Locate the containers that probably hold one catalog item each.
///
/// Class-named containers win outright. Only when there are none do item
/// links stand in, each contributing its parent element. Parents reached by
/// several links are yielded once per link.
pub fn candidate_blocks(html: &Html) -> (Origin, Vec<ElementRef<'_>>) {
    let by_class: Vec<ElementRef> = html
        .select(&CONTAINER_SEL)
        .filter(|el| has_item_class(el))
        .collect();
    if !by_class.is_empty() {
        return (Origin::ClassMatch, by_class);
    }

    let by_anchor = html
        .select(&ANCHOR_SEL)
        .filter(|a| is_item_link(a))
        .filter_map(|a| a.parent().and_then(ElementRef::wrap))
        .collect();
    (Origin::AnchorParent, by_anchor)
}

fn has_item_class(el: &ElementRef) -> bool {
    el.value().classes().any(|c| ITEM_CLASS_RE.is_match(c))
}

pub fn is_item_link(el: &ElementRef) -> bool {
    el.value()
        .attr("href")
        .is_some_and(|href| ITEM_HREF_RE.is_match(href))
}
