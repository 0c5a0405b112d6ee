use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Which listing a record was last seen on. Assigned from the page, never from the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Released,
    Upcoming,
}

impl ReleaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseStatus::Released => "released",
            ReleaseStatus::Upcoming => "upcoming",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "released" => Ok(ReleaseStatus::Released),
            "upcoming" => Ok(ReleaseStatus::Upcoming),
            other => Err(format!("unknown release status '{}'", other)),
        }
    }
}

impl ToSql for ReleaseStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ReleaseStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Physical edition named in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "Blu-ray")]
    BluRay,
    #[serde(rename = "DVD")]
    Dvd,
    #[serde(rename = "4K")]
    UltraHd,
    #[serde(rename = "Collector's Set")]
    CollectorsSet,
}

impl Format {
    pub const ALL: [Format; 4] = [
        Format::BluRay,
        Format::Dvd,
        Format::UltraHd,
        Format::CollectorsSet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::BluRay => "Blu-ray",
            Format::Dvd => "DVD",
            Format::UltraHd => "4K",
            Format::CollectorsSet => "Collector's Set",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown format '{}'", s))
    }
}

impl ToSql for Format {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Format {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// One catalog item as extracted from a listing page.
///
/// `title` is never empty; every other field may be missing and is merged
/// with COALESCE semantics when the record meets a stored one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub external_id: Option<String>,
    pub title: String,
    pub director: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub release_status: Option<ReleaseStatus>,
    pub format: Option<Format>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub source_url: Option<String>,
    pub cover_art_url: Option<String>,
}

impl Record {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            external_id: None,
            title: title.into(),
            director: None,
            release_date: None,
            release_status: None,
            format: None,
            price: None,
            description: None,
            source_url: None,
            cover_art_url: None,
        }
    }

    /// (title, director) with an absent director read as the empty string.
    pub fn identity_key(&self) -> (&str, &str) {
        (&self.title, self.director.as_deref().unwrap_or(""))
    }
}

/// A record as persisted, with its row id and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: Record,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
