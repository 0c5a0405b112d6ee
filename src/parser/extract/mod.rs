pub mod director;
pub mod links;
pub mod release;
pub mod title;

use scraper::ElementRef;
use tracing::{debug, warn};
use url::Url;

use crate::error::FieldError;
use crate::record::{Record, ReleaseStatus};

/// One candidate block plus what every rule needs to look at it.
pub struct Block<'a> {
    pub el: ElementRef<'a>,
    /// All descendant text, concatenated as-is.
    pub text: String,
    pub origin: &'a Url,
}

impl<'a> Block<'a> {
    pub fn new(el: ElementRef<'a>, origin: &'a Url) -> Self {
        Self {
            el,
            text: el.text().collect(),
            origin,
        }
    }
}

/// A single heuristic for one field. Rules for a field are tried in order and
/// the first `Some` wins.
pub type Rule<T> = fn(&Block<'_>) -> Option<T>;

pub fn first_match<T>(rules: &[Rule<T>], block: &Block<'_>) -> Option<T> {
    rules.iter().find_map(|rule| rule(block))
}

/// Derive a record from one block, or nothing if no title can be found.
///
/// Every field is derived on its own; a failing rule costs that field only.
pub fn build_record(block: &Block<'_>, status: ReleaseStatus) -> Option<Record> {
    let Some(title) = first_match(title::RULES, block) else {
        debug!("Skipping block without a usable title");
        return None;
    };

    let mut record = Record::new(title);
    record.release_status = Some(status);
    record.director = first_match(director::RULES, block);
    record.release_date = first_match(release::DATE_RULES, block);
    record.external_id = first_match(release::SPINE_RULES, block);
    record.format = first_match(release::FORMAT_RULES, block);
    record.price = first_match(release::PRICE_RULES, block);
    record.cover_art_url = settle(&record.title, first_match(links::COVER_RULES, block));
    record.source_url = settle(&record.title, first_match(links::SOURCE_RULES, block));

    debug!("Extracted: {}", record.title);
    Some(record)
}

fn settle<T>(title: &str, found: Option<Result<T, FieldError>>) -> Option<T> {
    match found? {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Dropping field for '{}': {}", title, e);
            None
        }
    }
}

/// Whitespace-collapsed text of an element.
pub fn clean_text(el: &ElementRef) -> String {
    collapse(&el.text().collect::<String>())
}

pub fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
