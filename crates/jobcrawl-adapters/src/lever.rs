use async_trait::async_trait;
use chrono::DateTime;
use jobcrawl_core::{JobRecord, RemoteFlag};
use jobcrawl_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{board_slug, nullable, AdapterError, ScrapeRequest, SourceAdapter};

const PAGE_SIZE: usize = 100;
const GLOBAL_BASE: &str = "https://api.lever.co";
const EU_BASE: &str = "https://api.eu.lever.co";

#[derive(Debug, Clone, Copy, Default)]
pub struct LeverAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Posting {
    #[serde(deserialize_with = "nullable")]
    text: String,
    #[serde(deserialize_with = "nullable")]
    hosted_url: String,
    #[serde(deserialize_with = "nullable")]
    categories: Categories,
    #[serde(deserialize_with = "nullable")]
    workplace_type: String,
    #[serde(deserialize_with = "nullable")]
    description_plain: String,
    #[serde(deserialize_with = "nullable")]
    opening_plain: String,
    created_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Categories {
    #[serde(deserialize_with = "nullable")]
    location: String,
    #[serde(deserialize_with = "nullable")]
    department: String,
    #[serde(deserialize_with = "nullable")]
    team: String,
    #[serde(deserialize_with = "nullable")]
    commitment: String,
    #[serde(deserialize_with = "nullable")]
    all_locations: Vec<String>,
}

/// Account id and regional API base for a Lever locator.
///
/// Accepts posting API URLs, `jobs.lever.co` career pages (EU variants
/// included), and bare account ids.
pub(crate) fn account(locator: &str) -> Result<(String, &'static str), AdapterError> {
    let invalid = || AdapterError::InvalidLocator(locator.to_string());
    match Url::parse(locator.trim()) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            let base = if host.contains("eu.lever.co") { EU_BASE } else { GLOBAL_BASE };
            let segments: Vec<&str> = url
                .path_segments()
                .map(|s| s.filter(|p| !p.is_empty()).collect())
                .unwrap_or_default();
            let id = match segments.as_slice() {
                ["v0", "postings", id, ..] => *id,
                [id, ..] => *id,
                [] => return Err(invalid()),
            };
            Ok((id.to_string(), base))
        }
        Err(_) => board_slug(locator).map(|id| (id.to_string(), GLOBAL_BASE)).ok_or_else(invalid),
    }
}

pub(crate) fn page_url(base: &str, id: &str, skip: usize) -> String {
    format!("{base}/v0/postings/{id}?skip={skip}&limit={PAGE_SIZE}&mode=json")
}

pub(crate) fn parse_posting(posting: Posting, req: &ScrapeRequest) -> JobRecord {
    let categories = posting.categories;
    let location = if categories.all_locations.is_empty() {
        categories.location
    } else {
        categories.all_locations.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
    };
    let department = if categories.team.is_empty() {
        categories.department
    } else {
        categories.team
    };
    let remote = match posting.workplace_type.to_ascii_lowercase().as_str() {
        "remote" => RemoteFlag::Remote,
        "hybrid" => RemoteFlag::Hybrid,
        _ => RemoteFlag::Onsite,
    };
    let description = if posting.description_plain.is_empty() {
        posting.opening_plain
    } else {
        posting.description_plain
    };
    let posted = posting
        .created_at
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    JobRecord::new(&req.company_name, posting.text, posting.hosted_url)
        .with_location(location)
        .with_description(description.trim())
        .with_employment_type(categories.commitment)
        .with_department(department)
        .with_posted_date(&posted)
        .with_remote(remote)
        .with_origin(&req.company_description, &req.label, "Lever")
}

#[async_trait]
impl SourceAdapter for LeverAdapter {
    fn name(&self) -> &'static str {
        "Lever"
    }

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError> {
        let (id, base) = account(&req.locator)?;
        let mut jobs = Vec::new();
        let mut skip = 0;

        loop {
            let page: Vec<Posting> = http.get_json(&page_url(base, &id, skip)).await?;
            let page_len = page.len();
            jobs.extend(page.into_iter().map(|p| parse_posting(p, req)));
            debug!(company = %req.company_name, page_len, total = jobs.len(), "lever page parsed");

            if page_len < PAGE_SIZE {
                break;
            }
            skip += PAGE_SIZE;
            if !req.page_delay.is_zero() {
                tokio::time::sleep(req.page_delay).await;
            }
        }
        Ok(jobs)
    }
}
