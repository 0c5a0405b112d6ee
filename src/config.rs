use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::record::ReleaseStatus;

const DEFAULT_CONFIG_FILE: &str = "release_tracker.toml";
const ENV_PREFIX: &str = "TRACKER";

/// One listing page to scrape, and the status its items are filed under.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TargetPage {
    pub name: String,
    pub url: String,
    pub status: ReleaseStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Origin used to resolve root-relative links found in listings.
    pub site_origin: String,
    pub user_agent: String,
    pub request_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub schedule_interval_secs: u64,
    pub pages: Vec<TargetPage>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/releases.sqlite"),
            site_origin: "https://www.criterion.com".into(),
            user_agent: "Criterion Collection Release Tracker Bot 1.0 (Educational/Personal Use)"
                .into(),
            request_delay_secs: 2,
            request_timeout_secs: 30,
            schedule_interval_secs: 24 * 60 * 60,
            pages: vec![
                TargetPage {
                    name: "new_releases".into(),
                    url: "https://www.criterion.com/shop/browse?popular=new-releases".into(),
                    status: ReleaseStatus::Released,
                },
                TargetPage {
                    name: "coming_soon".into(),
                    url: "https://www.criterion.com/shop/browse?popular=coming-soon".into(),
                    status: ReleaseStatus::Upcoming,
                },
            ],
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (if present), then `TRACKER_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(file).required(path.is_some()))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load settings from {:?}", file))?
            .try_deserialize::<Settings>()
            .context("Invalid settings")?;
        Ok(settings)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }
}
