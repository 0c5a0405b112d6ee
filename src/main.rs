mod config;
mod db;
mod error;
mod fetcher;
mod orchestrator;
mod parser;
mod record;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{Pagination, RecordFilter, RecordStore};
use crate::orchestrator::{Orchestrator, RunOutcome, RunReport};
use crate::record::{ReleaseStatus, StoredRecord};

#[derive(Parser)]
#[command(name = "release_tracker", about = "Criterion catalog release tracker")]
struct Cli {
    /// Settings file (default: ./release_tracker.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,
    /// Scrape every configured listing page once
    Scrape,
    /// Keep running, scraping on the configured interval
    Watch {
        /// Run immediately instead of waiting one interval
        #[arg(long)]
        now: bool,
    },
    /// Stored releases, newest first
    List {
        /// Filter by status (released, upcoming)
        #[arg(short, long)]
        status: Option<ReleaseStatus>,
        /// Title or director contains
        #[arg(short = 'q', long)]
        search: Option<String>,
        /// Rows per page
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Page number (1-based)
        #[arg(short, long, default_value = "1")]
        page: usize,
    },
    /// One release by id
    Show { id: i64 },
    /// Dump every record as JSON
    Export {
        /// Write to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Init => {
            let store = RecordStore::new(&settings.database_path);
            store.init_schema()?;
            println!(
                "Schema ready at {} ({} records)",
                store.path().display(),
                store.count()?
            );
            Ok(())
        }
        Commands::Scrape => {
            let orch = Orchestrator::from_settings(&settings)?;
            println!("Scraping {} pages...", settings.pages.len());
            let pb = spinner("scraping");
            let outcome = orch.run_now().await;
            pb.finish_and_clear();
            match outcome {
                RunOutcome::Completed(report) => {
                    print_report(&report);
                    Ok(())
                }
                RunOutcome::Failed(err) => Err(anyhow::anyhow!("Scrape failed: {}", err)),
                RunOutcome::Busy => {
                    println!("A scrape is already in progress.");
                    Ok(())
                }
            }
        }
        Commands::Watch { now } => {
            let orch = Arc::new(Orchestrator::from_settings(&settings)?);
            let schedule = orch.spawn_schedule(settings.schedule_interval(), now);

            let mut updates = orch.subscribe();
            let reporter = tokio::spawn(async move {
                while updates.changed().await.is_ok() {
                    let s = updates.borrow_and_update().clone();
                    if s.in_progress {
                        continue;
                    }
                    match &s.last_error {
                        Some(err) => warn!("Run finished with error: {}", err),
                        None => info!("Run finished: {} records stored", s.total_records),
                    }
                }
            });

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            info!("Shutting down");
            schedule.abort();
            reporter.abort();
            Ok(())
        }
        Commands::List {
            status,
            search,
            limit,
            page,
        } => {
            let store = open_store(&settings)?;
            let filter = RecordFilter {
                status,
                search,
                title_order: true,
                ..RecordFilter::default()
            };
            let result = store.query_page(
                &filter,
                Pagination {
                    page,
                    per_page: limit,
                },
            )?;
            if result.records.is_empty() {
                println!("No releases found.");
                return Ok(());
            }

            println!(
                "{:>5} | {:<32} | {:<20} | {:<10} | {:<8} | {:<14} | {:>5}",
                "Id", "Title", "Director", "Date", "Status", "Format", "Spine"
            );
            println!("{}", "-".repeat(112));

            for r in &result.records {
                let rec = &r.record;
                println!(
                    "{:>5} | {:<32} | {:<20} | {:<10} | {:<8} | {:<14} | {:>5}",
                    r.id,
                    truncate(&rec.title, 32),
                    truncate(rec.director.as_deref().unwrap_or("-"), 20),
                    or_dash(rec.release_date),
                    or_dash(rec.release_status),
                    or_dash(rec.format),
                    rec.external_id.as_deref().unwrap_or("-"),
                );
            }

            println!(
                "\nPage {}/{} | {} releases",
                result.page,
                result.total_pages.max(1),
                result.total
            );
            Ok(())
        }
        Commands::Show { id } => {
            let store = open_store(&settings)?;
            match store.get_by_id(id)? {
                Some(r) => print_record(&r),
                None => println!("No release with id {}", id),
            }
            Ok(())
        }
        Commands::Export { output } => {
            let store = open_store(&settings)?;
            let export = store.export_all()?;
            let json = serde_json::to_string_pretty(&export)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("Exported {} records to {}", export.total, path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Stats => {
            let store = open_store(&settings)?;
            let s = store.stats(Utc::now().date_naive())?;
            println!("Total:     {}", s.total);
            println!("Recent:    {}", s.recent_releases);
            println!("Upcoming:  {}", s.upcoming);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<RecordStore> {
    let store = RecordStore::new(&settings.database_path);
    store.init_schema()?;
    Ok(store)
}

fn spinner(msg: &'static str) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_report(report: &RunReport) {
    for p in &report.pages {
        match &p.error {
            Some(err) => println!("  {:<14} FAILED  {}", p.name, err),
            None => println!("  {:<14} {:>4} records  {}", p.name, p.extracted, p.url),
        }
    }
    println!(
        "Done: {} extracted ({} new, {} updated, {} errors). {} records stored.",
        report.extracted,
        report.upsert.inserted,
        report.upsert.updated,
        report.upsert.errors.len(),
        report.total_records
    );
}

fn print_record(r: &StoredRecord) {
    let rec = &r.record;
    println!("#{} {}", r.id, rec.title);
    println!("Director:  {}", rec.director.as_deref().unwrap_or("-"));
    println!("Released:  {}", or_dash(rec.release_date));
    println!("Status:    {}", or_dash(rec.release_status));
    println!("Format:    {}", or_dash(rec.format));
    println!("Spine:     {}", rec.external_id.as_deref().unwrap_or("-"));
    println!("Price:     {}", rec.price.as_deref().unwrap_or("-"));
    println!("Source:    {}", rec.source_url.as_deref().unwrap_or("-"));
    println!("Cover:     {}", rec.cover_art_url.as_deref().unwrap_or("-"));
    if let Some(desc) = &rec.description {
        println!("\n{}", desc);
    }
    println!(
        "\nFirst seen {} | updated {}",
        r.created_at.format("%Y-%m-%d %H:%M"),
        r.updated_at.format("%Y-%m-%d %H:%M")
    );
}

fn or_dash<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("Seven Samurai", 32), "Seven Samurai");
        assert_eq!(truncate("The Discreet Charm of the Bourgeoisie", 12), "The Discr...");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_list_filters() {
        let cli = Cli::try_parse_from(["release_tracker", "list", "-s", "upcoming", "-q", "ozu"]).unwrap();
        match cli.command {
            Commands::List { status, search, limit, page } => {
                assert_eq!(status, Some(ReleaseStatus::Upcoming));
                assert_eq!(search.as_deref(), Some("ozu"));
                assert_eq!((limit, page), (20, 1));
            }
            _ => panic!("expected list"),
        }
    }
}
