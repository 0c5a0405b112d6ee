use std::sync::LazyLock;

use scraper::Selector;
use url::Url;

use super::{Block, Rule};
use crate::error::FieldError;
use crate::parser::blocks::is_item_link;

static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

pub const COVER_RULES: &[Rule<Result<String, FieldError>>] = &[from_first_image];
pub const SOURCE_RULES: &[Rule<Result<String, FieldError>>] = &[from_item_anchor];

pub fn from_first_image(block: &Block<'_>) -> Option<Result<String, FieldError>> {
    let src = block.el.select(&IMG_SEL).next()?.value().attr("src")?;
    resolve(block.origin, src)
}

pub fn from_item_anchor(block: &Block<'_>) -> Option<Result<String, FieldError>> {
    let href = block
        .el
        .select(&ANCHOR_SEL)
        .find(is_item_link)?
        .value()
        .attr("href")?;
    resolve(block.origin, href)
}

/// Absolute links pass through; root-relative ones are joined to the site
/// origin. Anything else (page-relative, `data:`) is not a usable link.
pub fn resolve(origin: &Url, href: &str) -> Option<Result<String, FieldError>> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(Ok(href.to_string()));
    }
    if !href.starts_with('/') {
        return None;
    }
    Some(
        origin
            .join(href)
            .map(String::from)
            .map_err(|source| FieldError::Link {
                href: href.to_string(),
                source,
            }),
    )
}
