use async_trait::async_trait;
use jobcrawl_core::{JobRecord, RemoteFlag};
use jobcrawl_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{html_to_text, join_non_empty, nullable, AdapterError, ScrapeRequest, SourceAdapter};

const HOST_SUFFIX: &str = ".recruitee.com";

#[derive(Debug, Clone, Copy, Default)]
pub struct RecruiteeAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Board {
    #[serde(deserialize_with = "nullable")]
    offers: Vec<Offer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Offer {
    #[serde(deserialize_with = "nullable")]
    title: String,
    #[serde(deserialize_with = "nullable")]
    careers_url: String,
    #[serde(deserialize_with = "nullable")]
    locations: Vec<Place>,
    #[serde(deserialize_with = "nullable")]
    city: String,
    #[serde(deserialize_with = "nullable")]
    country: String,
    #[serde(deserialize_with = "nullable")]
    location: String,
    #[serde(deserialize_with = "nullable")]
    description: String,
    #[serde(deserialize_with = "nullable")]
    employment_type_code: String,
    #[serde(deserialize_with = "nullable")]
    department: String,
    #[serde(deserialize_with = "nullable")]
    published_at: String,
    #[serde(deserialize_with = "nullable")]
    remote: bool,
    #[serde(deserialize_with = "nullable")]
    hybrid: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Place {
    #[serde(deserialize_with = "nullable")]
    city: String,
    #[serde(deserialize_with = "nullable")]
    country: String,
}

/// Offers API URL. Recruitee boards live on `{company}.recruitee.com`.
pub(crate) fn api_url(locator: &str) -> Result<String, AdapterError> {
    let locator = locator.trim();
    if locator.contains("/api/offers") {
        return Ok(locator.to_string());
    }
    let host = Url::parse(locator)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .ok_or_else(|| AdapterError::InvalidLocator(locator.to_string()))?;
    let company = host
        .strip_suffix(HOST_SUFFIX)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AdapterError::InvalidLocator(locator.to_string()))?;
    Ok(format!("https://{company}{HOST_SUFFIX}/api/offers"))
}

/// `fulltime_permanent` -> `Fulltime Permanent`.
fn title_case(code: &str) -> String {
    code.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) fn parse_board(board: Board, req: &ScrapeRequest) -> Vec<JobRecord> {
    board
        .offers
        .into_iter()
        .map(|offer| {
            let mut location = offer
                .locations
                .first()
                .map(|place| join_non_empty([place.city.as_str(), place.country.as_str()]))
                .unwrap_or_default();
            if location.is_empty() {
                location = join_non_empty([offer.city.as_str(), offer.country.as_str()]);
            }
            if location.is_empty() {
                location = offer.location.clone();
            }
            let remote = if offer.hybrid {
                RemoteFlag::Hybrid
            } else if offer.remote {
                RemoteFlag::Remote
            } else {
                RemoteFlag::Onsite
            };
            let posted = offer.published_at.split(' ').next().unwrap_or_default();

            JobRecord::new(&req.company_name, offer.title, offer.careers_url)
                .with_location(location)
                .with_description(html_to_text(&offer.description))
                .with_employment_type(title_case(&offer.employment_type_code))
                .with_department(offer.department)
                .with_posted_date(posted)
                .with_remote(remote)
                .with_origin(&req.company_description, &req.label, "Recruitee")
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for RecruiteeAdapter {
    fn name(&self) -> &'static str {
        "Recruitee"
    }

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError> {
        let board: Board = http.get_json(&api_url(&req.locator)?).await?;
        let jobs = parse_board(board, req);
        debug!(company = %req.company_name, count = jobs.len(), "recruitee offers parsed");
        Ok(jobs)
    }
}
