use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::{clean_text, Block, Rule};
use crate::parser::blocks::is_item_link;

static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2, h3, h4").unwrap());
static STRONG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("strong").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Button and badge labels that sit where a title would.
const UI_LABELS: &[&str] = &["Quick Shop", "Buy Now", "View", "Released", "Available"];

pub const RULES: &[Rule<String>] = &[from_heading, from_strong, from_item_link];

pub fn from_heading(block: &Block<'_>) -> Option<String> {
    accept(block.el.select(&HEADING_SEL).next()?)
}

pub fn from_strong(block: &Block<'_>) -> Option<String> {
    accept(block.el.select(&STRONG_SEL).next()?)
}

pub fn from_item_link(block: &Block<'_>) -> Option<String> {
    accept(block.el.select(&ANCHOR_SEL).find(is_item_link)?)
}

/// Only the first element of each kind is considered.
fn accept(el: ElementRef) -> Option<String> {
    let text = clean_text(&el);
    (text.chars().count() > 2 && !UI_LABELS.contains(&text.as_str())).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::extract::first_match;
    use scraper::Html;
    use url::Url;

    fn title_of(html: &str) -> Option<String> {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("div").unwrap();
        let el = doc.select(&sel).next().unwrap();
        let origin = Url::parse("https://example.com").unwrap();
        first_match(RULES, &Block::new(el, &origin))
    }

    #[test]
    fn heading_wins_over_strong_and_link() {
        let html = r#"<div><a href="/films/1">Link Title</a><strong>Bold Title</strong><h4>  The   Leopard </h4></div>"#;
        assert_eq!(title_of(html).as_deref(), Some("The Leopard"));
    }

    #[test]
    fn first_heading_of_any_level_in_document_order() {
        let html = r#"<div><h4>Mishima</h4><h2>Paris, Texas</h2></div>"#;
        assert_eq!(title_of(html).as_deref(), Some("Mishima"));
    }

    #[test]
    fn ui_label_heading_falls_through_to_strong() {
        let html = r#"<div><h3>Quick Shop</h3><strong>Cléo from 5 to 7</strong></div>"#;
        assert_eq!(title_of(html).as_deref(), Some("Cléo from 5 to 7"));
    }

    #[test]
    fn link_text_is_last_resort() {
        let html = r#"<div><a href="/cart">Cart</a><a href="/shop/product/9-m">Vampyr</a></div>"#;
        assert_eq!(title_of(html).as_deref(), Some("Vampyr"));
    }

    #[test]
    fn short_text_is_rejected() {
        assert_eq!(title_of("<div><h2>M</h2></div>"), None);
        assert_eq!(title_of("<div><h2>8½</h2></div>"), None);
        assert_eq!(title_of("<div><h2>Ran</h2></div>").as_deref(), Some("Ran"));
    }

    #[test]
    fn label_match_is_exact() {
        assert_eq!(
            title_of("<div><h2>Available Light</h2></div>").as_deref(),
            Some("Available Light")
        );
        assert_eq!(title_of("<div><h2>Available</h2></div>"), None);
    }
}
