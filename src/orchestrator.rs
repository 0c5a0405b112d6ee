use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::{Settings, TargetPage};
use crate::db::{RecordStore, UpsertSummary};
use crate::fetcher::{PageFetcher, PageSource};
use crate::parser::RecordExtractor;
use crate::record::Record;

/// Live view of the current or most recent scrape. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatus {
    pub in_progress: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_records: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trigger {
    pub started: bool,
}

#[derive(Debug)]
pub struct PageReport {
    pub name: String,
    pub url: String,
    pub extracted: usize,
    pub error: Option<String>,
}

/// Scrape stats returned after a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub pages: Vec<PageReport>,
    pub extracted: usize,
    pub upsert: UpsertSummary,
    pub total_records: usize,
}

impl RunReport {
    /// One line naming every page that contributed nothing because it failed.
    pub fn page_failures(&self) -> Option<String> {
        let failed: Vec<String> = self
            .pages
            .iter()
            .filter_map(|p| p.error.as_ref().map(|e| format!("{}: {}", p.name, e)))
            .collect();
        if failed.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} pages failed: {}",
            failed.len(),
            self.pages.len(),
            failed.join("; ")
        ))
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Another run holds the gate; nothing was done.
    Busy,
    Completed(RunReport),
    Failed(String),
}

/// Sequences fetch → extract → store over the configured pages, one run at a time.
pub struct Orchestrator {
    source: Arc<dyn PageSource>,
    extractor: RecordExtractor,
    store: RecordStore,
    pages: Vec<TargetPage>,
    page_delay: Duration,
    gate: Arc<AtomicBool>,
    status: Arc<watch::Sender<RunStatus>>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn PageSource>,
        extractor: RecordExtractor,
        store: RecordStore,
        pages: Vec<TargetPage>,
        page_delay: Duration,
    ) -> Self {
        let total_records = store.count().unwrap_or_else(|e| {
            warn!("Could not count stored records: {:#}", e);
            0
        });
        let (status, _) = watch::channel(RunStatus {
            total_records,
            ..RunStatus::default()
        });
        Self {
            source,
            extractor,
            store,
            pages,
            page_delay,
            gate: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = RecordStore::new(&settings.database_path);
        store.init_schema()?;
        let fetcher = PageFetcher::new(settings)?;
        let extractor = RecordExtractor::new(&settings.site_origin)?;
        Ok(Self::new(
            Arc::new(fetcher),
            extractor,
            store,
            settings.pages.clone(),
            settings.request_delay(),
        ))
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// Start a run in the background unless one is already going.
    pub fn trigger_run(self: &Arc<Self>) -> Trigger {
        let Some(guard) = self.begin() else {
            info!("Scrape requested while a run is in progress; ignoring");
            return Trigger { started: false };
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(guard).await;
        });
        Trigger { started: true }
    }

    /// Run in the caller's task and wait for the result.
    pub async fn run_now(&self) -> RunOutcome {
        match self.begin() {
            Some(guard) => self.execute(guard).await,
            None => RunOutcome::Busy,
        }
    }

    /// Fire `trigger_run` every `every`. Collisions with a manual run are skipped.
    pub fn spawn_schedule(self: &Arc<Self>, every: Duration, immediately: bool) -> JoinHandle<()> {
        let every = every.max(Duration::from_millis(1));
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let first = if immediately {
                Instant::now()
            } else {
                Instant::now() + every
            };
            let mut ticker = tokio::time::interval_at(first, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Scheduled scraping every {}s", every.as_secs());
            loop {
                ticker.tick().await;
                info!("Starting scheduled scraping");
                if !this.trigger_run().started {
                    info!("Scheduled run skipped: previous run still in progress");
                }
            }
        })
    }

    fn begin(&self) -> Option<RunGuard> {
        self.gate
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        self.status.send_modify(|s| {
            s.in_progress = true;
            s.last_run_at = Some(Utc::now());
            s.last_error = None;
        });
        Some(RunGuard {
            gate: Arc::clone(&self.gate),
            status: Arc::clone(&self.status),
        })
    }

    async fn execute(&self, _guard: RunGuard) -> RunOutcome {
        info!("Starting scrape run over {} pages", self.pages.len());
        match self.pipeline().await {
            Ok(report) => {
                self.status.send_modify(|s| {
                    s.last_success_at = Some(Utc::now());
                    s.total_records = report.total_records;
                    s.last_error = report.page_failures();
                });
                info!(
                    "Scraping completed: {} extracted, {} new, {} updated, {} total",
                    report.extracted,
                    report.upsert.inserted,
                    report.upsert.updated,
                    report.total_records
                );
                RunOutcome::Completed(report)
            }
            Err(e) => {
                let msg = format!("{:#}", e);
                error!("Scraping failed: {}", msg);
                self.status.send_modify(|s| s.last_error = Some(msg.clone()));
                RunOutcome::Failed(msg)
            }
        }
    }

    async fn pipeline(&self) -> Result<RunReport> {
        let mut records: Vec<Record> = Vec::new();
        let mut pages = Vec::with_capacity(self.pages.len());

        for (i, target) in self.pages.iter().enumerate() {
            if i > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            info!("Scraping {}: {}", target.name, target.url);
            let found = match self.source.fetch(&target.url).await {
                Ok(doc) => Ok(self
                    .extractor
                    .extract_candidates(&doc, target.status)
                    .collect::<Vec<_>>()),
                Err(e) => Err(e),
            };

            let report = match found {
                Ok(found) => {
                    info!("Extracted {} records from {}", found.len(), target.url);
                    let extracted = found.len();
                    records.extend(found);
                    PageReport {
                        name: target.name.clone(),
                        url: target.url.clone(),
                        extracted,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Error fetching {}: {}", target.name, e);
                    PageReport {
                        name: target.name.clone(),
                        url: e.url().to_string(),
                        extracted: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            pages.push(report);
        }

        let extracted = records.len();
        if records.is_empty() {
            warn!("No records were scraped. Check site structure or selectors.");
        }

        let store = self.store.clone();
        let upsert = tokio::task::spawn_blocking(move || store.upsert(&records))
            .await
            .context("Store task panicked")??;
        let store = self.store.clone();
        let total_records = tokio::task::spawn_blocking(move || store.count())
            .await
            .context("Store task panicked")??;

        Ok(RunReport {
            pages,
            extracted,
            upsert,
            total_records,
        })
    }
}

/// Held for the lifetime of one run. Dropping it, even while unwinding, marks
/// the run finished and opens the gate.
struct RunGuard {
    gate: Arc<AtomicBool>,
    status: Arc<watch::Sender<RunStatus>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.status.send_modify(|s| s.in_progress = false);
        self.gate.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetcher::Document;
    use crate::record::ReleaseStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Semaphore;

    const PAGE_B: &str = r#"<html><body>
        <div class="product-card"><h3>Seven Samurai</h3><p>Akira Kurosawa</p><p>Available April 1, 2025</p></div>
        <div class="product-card"><h3>Ikiru</h3><p>Akira Kurosawa</p></div>
    </body></html>"#;

    /// Serves canned pages; URLs without a page answer 503.
    struct ScriptedSource {
        pages: HashMap<String, String>,
        hold: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
            if let Some(hold) = &self.hold {
                let _permit = hold.acquire().await.unwrap();
            }
            match self.pages.get(url) {
                Some(body) => Document::parse(url, body),
                None => Err(FetchError::Status {
                    url: url.to_string(),
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                }),
            }
        }
    }

    fn targets() -> Vec<TargetPage> {
        vec![
            TargetPage {
                name: "page_a".into(),
                url: "https://example.com/a".into(),
                status: ReleaseStatus::Released,
            },
            TargetPage {
                name: "page_b".into(),
                url: "https://example.com/b".into(),
                status: ReleaseStatus::Upcoming,
            },
        ]
    }

    fn orchestrator(
        dir: &tempfile::TempDir,
        hold: Option<Arc<Semaphore>>,
    ) -> Arc<Orchestrator> {
        let store = RecordStore::new(dir.path().join("runs.sqlite"));
        store.init_schema().unwrap();
        let source = ScriptedSource {
            pages: HashMap::from([("https://example.com/b".to_string(), PAGE_B.to_string())]),
            hold,
        };
        Arc::new(Orchestrator::new(
            Arc::new(source),
            RecordExtractor::new("https://example.com").unwrap(),
            store,
            targets(),
            Duration::ZERO,
        ))
    }

    #[tokio::test]
    async fn failed_page_does_not_sink_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, None);

        let RunOutcome::Completed(report) = orch.run_now().await else {
            panic!("run should complete");
        };
        assert_eq!(report.extracted, 2);
        assert_eq!(report.upsert.inserted, 2);
        assert_eq!(report.pages[0].extracted, 0);
        assert!(report.pages[0].error.is_some());
        assert_eq!(report.pages[0].url, "https://example.com/a");
        assert_eq!(report.pages[1].url, "https://example.com/b");

        let status = orch.status();
        assert!(!status.in_progress);
        assert!(status.last_run_at.is_some());
        assert!(status.last_success_at.is_some());
        assert_eq!(status.total_records, 2);
        let err = status.last_error.unwrap();
        assert!(err.contains("page_a"), "{}", err);
        assert!(err.contains("503"), "{}", err);

        let stored = orch.store().query(&Default::default()).unwrap();
        assert!(stored
            .iter()
            .all(|r| r.record.release_status == Some(ReleaseStatus::Upcoming)));
    }

    #[tokio::test]
    async fn second_trigger_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let hold = Arc::new(Semaphore::new(0));
        let orch = orchestrator(&dir, Some(Arc::clone(&hold)));
        let mut updates = orch.subscribe();

        assert_eq!(orch.trigger_run(), Trigger { started: true });
        assert_eq!(orch.trigger_run(), Trigger { started: false });
        assert!(matches!(orch.run_now().await, RunOutcome::Busy));
        assert!(orch.status().in_progress);

        hold.add_permits(10);
        let done = updates
            .wait_for(|s| !s.in_progress && s.last_success_at.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(done.total_records, 2);

        // the gate is open again once the run is over
        assert!(matches!(orch.run_now().await, RunOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn concurrent_triggers_start_exactly_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let hold = Arc::new(Semaphore::new(0));
        let orch = orchestrator(&dir, Some(Arc::clone(&hold)));

        let results: Vec<Trigger> = (0..8).map(|_| orch.trigger_run()).collect();
        assert_eq!(results.iter().filter(|t| t.started).count(), 1);
        hold.add_permits(10);
    }

    #[tokio::test]
    async fn store_failure_is_recorded_and_releases_gate() {
        let dir = tempfile::tempdir().unwrap();
        // a regular file where the database directory should be
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let source = ScriptedSource {
            pages: HashMap::from([("https://example.com/b".to_string(), PAGE_B.to_string())]),
            hold: None,
        };
        let orch = Orchestrator::new(
            Arc::new(source),
            RecordExtractor::new("https://example.com").unwrap(),
            RecordStore::new(blocker.join("db.sqlite")),
            targets(),
            Duration::ZERO,
        );
        assert_eq!(orch.status().total_records, 0);

        assert!(matches!(orch.run_now().await, RunOutcome::Failed(_)));
        let status = orch.status();
        assert!(!status.in_progress);
        assert!(status.last_error.is_some());
        assert!(status.last_success_at.is_none());

        // not wedged: the next run starts (and fails the same way)
        assert!(matches!(orch.run_now().await, RunOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn new_run_clears_previous_error() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, None);
        orch.run_now().await;
        assert!(orch.status().last_error.is_some());

        let mut updates = orch.subscribe();
        assert!(orch.trigger_run().started);
        let running = orch.status();
        assert!(running.in_progress);
        assert!(running.last_error.is_none());

        updates.wait_for(|s| !s.in_progress).await.unwrap();
        // page_a still fails, so the finished run reports it again
        assert!(orch.status().last_error.is_some());
    }

    #[tokio::test]
    async fn status_is_seeded_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("seeded.sqlite"));
        store.init_schema().unwrap();
        store
            .upsert(&[Record::new("Ran"), Record::new("Ikiru"), Record::new("Stalker")])
            .unwrap();

        let orch = Orchestrator::new(
            Arc::new(ScriptedSource {
                pages: HashMap::new(),
                hold: None,
            }),
            RecordExtractor::new("https://example.com").unwrap(),
            store,
            targets(),
            Duration::ZERO,
        );
        let status = orch.status();
        assert_eq!(status.total_records, 3);
        assert!(!status.in_progress);
        assert!(status.last_run_at.is_none());
    }

    #[tokio::test]
    async fn schedule_fires_runs() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(&dir, None);
        let mut updates = orch.subscribe();

        let handle = orch.spawn_schedule(Duration::from_millis(20), false);
        let done = tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|s| s.last_success_at.is_some() && !s.in_progress),
        )
        .await
        .expect("scheduled run did not happen")
        .unwrap()
        .clone();
        handle.abort();

        assert_eq!(done.total_records, 2);
    }
}
