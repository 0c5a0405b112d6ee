use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, CONTENT_TYPE,
    USER_AGENT,
};
use scraper::Html;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::FetchError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A fetched listing page, parsed and ready for extraction.
pub struct Document {
    url: String,
    html: Html,
}

impl Document {
    pub fn parse(url: &str, body: &str) -> Result<Self, FetchError> {
        if body.trim().is_empty() {
            return Err(FetchError::Parse {
                url: url.to_string(),
                reason: "empty body".into(),
            });
        }
        Ok(Self {
            url: url.to_string(),
            html: Html::parse_document(body),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &Html {
        &self.html
    }
}

/// Anything that can hand the orchestrator a parsed page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError>;
}

/// Keeps at least `delay` between the starts of consecutive requests.
pub struct Pacer {
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_request: Mutex::new(None),
        }
    }

    /// Wait out the remainder of the delay, then claim the next slot.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.delay;
            if ready > Instant::now() {
                debug!("Pacing: waiting {:.1}s", (ready - Instant::now()).as_secs_f64());
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Rate-limited HTTP GETs against the catalog site.
pub struct PageFetcher {
    client: reqwest::Client,
    pacer: Pacer,
}

impl PageFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers(&settings.user_agent)?)
            .timeout(settings.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            pacer: Pacer::new(settings.request_delay()),
        })
    }
}

#[async_trait]
impl PageSource for PageFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.pacer.wait().await;

        info!("Fetching: {}", url);
        let start = std::time::Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.filter(|ct| !is_markup(ct)) {
            return Err(FetchError::Parse {
                url: url.to_string(),
                reason: format!("unexpected content type '{}'", ct),
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    source: e,
                }
            }
        })?;
        debug!(
            "Fetched {} ({} bytes in {}ms)",
            url,
            body.len(),
            start.elapsed().as_millis()
        );

        Document::parse(url, &body)
    }
}

fn default_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent).context("Invalid user agent")?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(headers)
}

fn is_markup(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.contains("html") || ct.contains("xml") || ct.starts_with("text/")
}
