use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::{error, info};

use crate::error::StoreWriteError;
use crate::record::{Record, ReleaseStatus, StoredRecord};

const RECORD_COLUMNS: &str = "id, external_id, title, director, release_date, release_status,
     format, price, description, source_url, cover_art_url, created_at, updated_at";

/// Durable record storage. Holds only the path; every operation opens its own
/// connection so readers never wait on a whole scrape run.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connect(&self) -> Result<Connection> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(&self.path)
            .with_context(|| format!("Failed to open {:?}", self.path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Ok(conn)
    }

    pub fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id    TEXT UNIQUE,
                title          TEXT NOT NULL CHECK(length(title) > 0),
                director       TEXT,
                release_date   TEXT,
                release_status TEXT CHECK(release_status IN ('released','upcoming')),
                format         TEXT,
                price          TEXT,
                description    TEXT,
                source_url     TEXT,
                cover_art_url  TEXT,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_release_date ON records(release_date);
            CREATE INDEX IF NOT EXISTS idx_records_release_status ON records(release_status);
            CREATE INDEX IF NOT EXISTS idx_records_identity ON records(title, director);
            ",
        )?;
        info!("Database initialized at {:?}", self.path);
        Ok(())
    }

    // ── Writes ──

    /// Insert new records and merge known ones, one record at a time.
    ///
    /// A record the database refuses is logged and reported in the summary;
    /// it never stops the rest of the batch.
    pub fn upsert(&self, records: &[Record]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let conn = self.connect()?;
        let tx = conn.unchecked_transaction()?;
        for record in records {
            match upsert_one(&tx, record) {
                Ok(Outcome::Inserted) => summary.inserted += 1,
                Ok(Outcome::Updated) => summary.updated += 1,
                Err(source) => {
                    error!("Database error for {}: {}", record.title, source);
                    summary.errors.push(StoreWriteError {
                        title: record.title.clone(),
                        director: record.director.clone(),
                        source,
                    });
                }
            }
        }
        tx.commit()?;

        info!(
            "Database updated: {} new, {} updated, {} failed",
            summary.inserted,
            summary.updated,
            summary.errors.len()
        );
        Ok(summary)
    }

    // ── Reads ──

    pub fn count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<StoredRecord>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS);
        let row = conn.query_row(&sql, [id], read_record).optional()?;
        Ok(row)
    }

    /// Newest release first, undated records last.
    pub fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>> {
        let conn = self.connect()?;
        let (where_clause, args) = filter.where_clause();
        let mut sql = format!(
            "SELECT {} FROM records{} ORDER BY release_date DESC NULLS LAST",
            RECORD_COLUMNS, where_clause
        );
        if filter.title_order {
            sql.push_str(", title ASC");
        }
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            filter.limit.map_or(-1, |n| n as i64),
            filter.offset
        ));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), read_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let conn = self.connect()?;
        let (where_clause, args) = filter.where_clause();
        let sql = format!("SELECT COUNT(*) FROM records{}", where_clause);
        let n: i64 = conn.query_row(&sql, rusqlite::params_from_iter(args.iter()), |r| r.get(0))?;
        Ok(n as usize)
    }

    /// One page of a filtered listing plus what a pager needs to draw itself.
    pub fn query_page(&self, filter: &RecordFilter, pagination: Pagination) -> Result<RecordPage> {
        let page = pagination.page.max(1);
        let per_page = pagination.per_page.max(1);
        let total = self.count_matching(filter)?;

        let paged = RecordFilter {
            limit: Some(per_page),
            offset: (page - 1) * per_page,
            ..filter.clone()
        };
        let records = self.query(&paged)?;
        let total_pages = total.div_ceil(per_page);

        Ok(RecordPage {
            records,
            total,
            page,
            per_page,
            total_pages,
            has_prev: page > 1,
            has_next: page < total_pages,
        })
    }

    pub fn export_all(&self) -> Result<Export> {
        let records = self.query(&RecordFilter::default())?;
        Ok(Export {
            exported_at: Utc::now(),
            total: records.len(),
            records,
        })
    }

    /// Counts for a status line; "recent" means released in the last 30 days.
    pub fn stats(&self, today: NaiveDate) -> Result<StoreStats> {
        let conn = self.connect()?;
        let cutoff = today - Duration::days(30);
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        let recent: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records
             WHERE release_status = 'released' AND release_date >= ?1",
            [cutoff],
            |r| r.get(0),
        )?;
        let upcoming: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE release_status = 'upcoming'",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreStats {
            total: total as usize,
            recent_releases: recent as usize,
            upcoming: upcoming as usize,
        })
    }
}

// ── Upsert internals ──

enum Outcome {
    Inserted,
    Updated,
}

fn upsert_one(conn: &Connection, record: &Record) -> rusqlite::Result<Outcome> {
    let now = Utc::now();
    match find_existing(conn, record)? {
        Some(id) => {
            conn.execute(
                "UPDATE records SET
                    external_id    = COALESCE(?1, external_id),
                    release_date   = COALESCE(?2, release_date),
                    release_status = COALESCE(?3, release_status),
                    format         = COALESCE(?4, format),
                    price          = COALESCE(?5, price),
                    description    = COALESCE(?6, description),
                    source_url     = COALESCE(?7, source_url),
                    cover_art_url  = COALESCE(?8, cover_art_url),
                    updated_at     = ?9
                 WHERE id = ?10",
                params![
                    record.external_id,
                    record.release_date,
                    record.release_status,
                    record.format,
                    record.price,
                    record.description,
                    record.source_url,
                    record.cover_art_url,
                    now,
                    id,
                ],
            )?;
            Ok(Outcome::Updated)
        }
        None => {
            conn.execute(
                "INSERT INTO records
                 (external_id, title, director, release_date, release_status, format,
                  price, description, source_url, cover_art_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    record.external_id,
                    record.title,
                    record.director,
                    record.release_date,
                    record.release_status,
                    record.format,
                    record.price,
                    record.description,
                    record.source_url,
                    record.cover_art_url,
                    now,
                ],
            )?;
            Ok(Outcome::Inserted)
        }
    }
}

/// Exact (title, director) match first. A record that arrives without a
/// director also matches the one stored record carrying that title.
fn find_existing(conn: &Connection, record: &Record) -> rusqlite::Result<Option<i64>> {
    let (title, director) = record.identity_key();
    let exact = conn
        .query_row(
            "SELECT id FROM records WHERE title = ?1 AND COALESCE(director, '') = ?2
             ORDER BY id LIMIT 1",
            params![title, director],
            |r| r.get(0),
        )
        .optional()?;
    if exact.is_some() || record.director.is_some() {
        return Ok(exact);
    }

    let mut stmt = conn.prepare("SELECT id FROM records WHERE title = ?1 LIMIT 2")?;
    let ids = stmt
        .query_map([title], |r| r.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(match ids.as_slice() {
        [only] => Some(*only),
        _ => None,
    })
}

fn read_record(row: &Row) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        record: Record {
            external_id: row.get(1)?,
            title: row.get(2)?,
            director: row.get(3)?,
            release_date: row.get(4)?,
            release_status: row.get(5)?,
            format: row.get(6)?,
            price: row.get(7)?,
            description: row.get(8)?,
            source_url: row.get(9)?,
            cover_art_url: row.get(10)?,
        },
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

// ── Result types ──

/// What one batch upsert did.
#[derive(Debug, Default)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<StoreWriteError>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub status: Option<ReleaseStatus>,
    /// Substring matched against title or director.
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Break release-date ties by title.
    pub title_order: bool,
}

impl RecordFilter {
    fn where_clause(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut args = Vec::new();

        if let Some(s) = self.status {
            args.push(s.as_str().to_string());
            conditions.push(format!("release_status = ?{}", args.len()));
        }
        if let Some(q) = self.search.as_deref().filter(|q| !q.is_empty()) {
            args.push(format!("%{}%", escape_like(q)));
            conditions.push(format!(
                "(title LIKE ?{n} ESCAPE '\\' OR director LIKE ?{n} ESCAPE '\\')",
                n = args.len()
            ));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        (clause, args)
    }
}

/// LIKE wildcards in user input match literally.
fn escape_like(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Serialize)]
pub struct Export {
    pub exported_at: DateTime<Utc>,
    pub total: usize,
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub recent_releases: usize,
    pub upcoming: usize,
}
