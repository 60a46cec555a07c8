//! Source adapter contracts, the label registry, and the built-in job board adapters.

use std::time::Duration;

use async_trait::async_trait;
use jobcrawl_core::JobRecord;
use jobcrawl_storage::{FetchError, HttpFetcher};
use scraper::{Html, Node};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

mod ashby;
mod greenhouse;
mod lever;
mod recruitee;
mod registry;
mod workable;

pub use ashby::AshbyAdapter;
pub use greenhouse::GreenhouseAdapter;
pub use lever::LeverAdapter;
pub use recruitee::RecruiteeAdapter;
pub use registry::{normalize_label, AdapterRegistry};
pub use workable::WorkableAdapter;

pub const CRATE_NAME: &str = "jobcrawl-adapters";

/// Everything an adapter needs to scrape one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRequest {
    /// Career page URL, board API URL, or bare board slug.
    pub locator: String,
    pub company_name: String,
    pub company_description: String,
    pub label: String,
    /// Pause between follow-up pages of a paginated board.
    pub page_delay: Duration,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("rate limited with http {status} by {url}")]
    RateLimited { status: u16, url: String },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("unexpected payload: {0}")]
    Parse(String),
    #[error("invalid locator `{0}`")]
    InvalidLocator(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Status codes boards use to push back on crawlers.
pub fn is_throttling_status(status: u16) -> bool {
    matches!(status, 403 | 429 | 503)
}

impl From<FetchError> for AdapterError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::HttpStatus { status, url } if is_throttling_status(status) => {
                AdapterError::RateLimited { status, url }
            }
            FetchError::HttpStatus { status, url } => AdapterError::HttpStatus { status, url },
            FetchError::Decode { url, source } => AdapterError::Parse(format!("{url}: {source}")),
            FetchError::Request(err) if err.is_timeout() => AdapterError::Timeout(err.to_string()),
            FetchError::Request(err) => match err.status().map(|s| s.as_u16()) {
                Some(status) if is_throttling_status(status) => AdapterError::RateLimited {
                    status,
                    url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                },
                _ => AdapterError::Connection(err.to_string()),
            },
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Board name written into the `ATS` column.
    fn name(&self) -> &'static str;

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError>;
}

/// Final path segment of a locator with query and trailing slashes removed.
pub(crate) fn board_slug(locator: &str) -> Option<&str> {
    let without_query = locator.trim().split(['?', '#']).next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains(':'))
}

/// Flattens an HTML fragment to whitespace-normalized text.
///
/// Some boards send entity-escaped markup, which decodes to more markup on
/// the first pass; that case gets a second pass.
pub fn html_to_text(html: &str) -> String {
    let first = fragment_text(html);
    if html.contains("&lt;") && first.contains('<') {
        fragment_text(&first)
    } else {
        first
    }
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "td", "section",
];

fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => out.push(' '),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Treats an explicit JSON `null` like a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn join_non_empty<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
