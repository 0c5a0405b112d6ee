use thiserror::Error;

/// A listing page that could not be turned into a document.
///
/// Contained at the page: the run logs it and the page contributes nothing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("could not read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Request { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Status { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::Parse { url, .. } => url,
        }
    }
}

/// One field rule that failed on one candidate block. The field is skipped.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("cannot resolve link '{href}': {source}")]
    Link {
        href: String,
        #[source]
        source: url::ParseError,
    },
}

/// A single record the store refused. The rest of the batch still lands.
#[derive(Debug, Error)]
#[error("could not store '{title}': {source}")]
pub struct StoreWriteError {
    pub title: String,
    pub director: Option<String>,
    #[source]
    pub source: rusqlite::Error,
}
