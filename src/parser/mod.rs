pub mod blocks;
pub mod extract;
pub mod normalize;

use anyhow::{Context, Result};
use tracing::info;
use url::Url;

use crate::fetcher::Document;
use crate::record::{Record, ReleaseStatus};
use extract::Block;

/// Two-pass pipeline: document → candidate blocks → records.
pub struct RecordExtractor {
    origin: Url,
}

impl RecordExtractor {
    pub fn new(site_origin: &str) -> Result<Self> {
        let origin = Url::parse(site_origin)
            .with_context(|| format!("Invalid site origin '{}'", site_origin))?;
        Ok(Self { origin })
    }

    /// Records for every candidate block that yields a title, lazily.
    pub fn extract_candidates<'a>(
        &'a self,
        doc: &'a Document,
        status: ReleaseStatus,
    ) -> impl Iterator<Item = Record> + 'a {
        let (origin, blocks) = blocks::candidate_blocks(doc.html());
        info!(
            "Found {} potential containers on {} ({:?})",
            blocks.len(),
            doc.url(),
            origin
        );
        blocks
            .into_iter()
            .filter_map(move |el| extract::build_record(&Block::new(el, &self.origin), status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixture(name: &str) -> Document {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Document::parse(&format!("https://www.criterion.com/{}", name), &html).unwrap()
    }

    fn extractor() -> RecordExtractor {
        RecordExtractor::new("https://www.criterion.com").unwrap()
    }

    #[test]
    fn new_releases_listing() {
        let doc = fixture("new_releases");
        let records: Vec<_> = extractor()
            .extract_candidates(&doc, ReleaseStatus::Released)
            .collect();

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Seven Samurai", "Tokyo Story", "The Seventh Seal"]);
        assert!(records
            .iter()
            .all(|r| r.release_status == Some(ReleaseStatus::Released)));

        let samurai = &records[0];
        assert_eq!(samurai.director.as_deref(), Some("Akira Kurosawa"));
        assert_eq!(samurai.external_id.as_deref(), Some("2"));
        assert_eq!(samurai.release_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(
            samurai.source_url.as_deref(),
            Some("https://www.criterion.com/films/165-seven-samurai")
        );

        // cover art served from a CDN keeps its absolute URL
        assert_eq!(
            records[1].cover_art_url.as_deref(),
            Some("https://s3.amazonaws.com/criterion-production/films/tokyo-story.jpg")
        );
    }

    #[test]
    fn coming_soon_listing_falls_back_to_links() {
        let doc = fixture("coming_soon");
        let records: Vec<_> = extractor()
            .extract_candidates(&doc, ReleaseStatus::Upcoming)
            .collect();

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Perfect Days", "Perfect Days", "Fallen Leaves"]);
        assert!(records
            .iter()
            .all(|r| r.release_status == Some(ReleaseStatus::Upcoming)));
        assert_eq!(records[2].release_date, NaiveDate::from_ymd_opt(2025, 4, 1));
    }

    #[test]
    fn empty_listing_yields_nothing() {
        let doc = Document::parse("https://www.criterion.com/x", "<html><body><p>Maintenance</p></body></html>")
            .unwrap();
        assert_eq!(
            extractor()
                .extract_candidates(&doc, ReleaseStatus::Released)
                .count(),
            0
        );
    }

    #[test]
    fn rejects_invalid_origin() {
        assert!(RecordExtractor::new("not a url").is_err());
    }
}
