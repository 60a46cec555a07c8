use async_trait::async_trait;
use jobcrawl_core::{JobRecord, RemoteFlag};
use jobcrawl_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{board_slug, html_to_text, nullable, AdapterError, ScrapeRequest, SourceAdapter};

const API_HOST: &str = "boards-api.greenhouse.io";

#[derive(Debug, Clone, Copy, Default)]
pub struct GreenhouseAdapter;

#[derive(Debug, Deserialize)]
pub(crate) struct Board {
    #[serde(default, deserialize_with = "nullable")]
    jobs: Vec<Posting>,
}

#[derive(Debug, Deserialize)]
struct Posting {
    #[serde(default, deserialize_with = "nullable")]
    title: String,
    #[serde(default, deserialize_with = "nullable")]
    absolute_url: String,
    #[serde(default)]
    location: JsonValue,
    #[serde(default, deserialize_with = "nullable")]
    offices: Vec<Named>,
    #[serde(default, deserialize_with = "nullable")]
    departments: Vec<Named>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    first_published: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default, deserialize_with = "nullable")]
    name: String,
}

/// Board API URL for a career page, board slug, or API URL.
pub(crate) fn api_url(locator: &str) -> Result<String, AdapterError> {
    if locator.contains(API_HOST) {
        return Ok(locator.trim().to_string());
    }
    let slug = board_slug(locator)
        .ok_or_else(|| AdapterError::InvalidLocator(locator.to_string()))?;
    Ok(format!("https://{API_HOST}/v1/boards/{slug}/jobs?content=true"))
}

pub(crate) fn parse_board(board: Board, req: &ScrapeRequest) -> Vec<JobRecord> {
    board
        .jobs
        .into_iter()
        .map(|posting| {
            let location_name = match &posting.location {
                JsonValue::Object(map) => map
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
                JsonValue::String(s) => s.clone(),
                _ => String::new(),
            };
            let offices = crate::join_non_empty(posting.offices.iter().map(|o| o.name.as_str()));
            let location = if offices.is_empty() {
                location_name.clone()
            } else {
                offices
            };
            let department = posting
                .departments
                .first()
                .map(|d| d.name.clone())
                .unwrap_or_default();

            JobRecord::new(&req.company_name, posting.title, posting.absolute_url)
                .with_location(location)
                .with_description(posting.content.as_deref().map(html_to_text).unwrap_or_default())
                .with_department(department)
                .with_posted_date(posting.first_published.as_deref().unwrap_or_default())
                .with_remote(RemoteFlag::infer(&location_name))
                .with_origin(&req.company_description, &req.label, "Greenhouse")
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for GreenhouseAdapter {
    fn name(&self) -> &'static str {
        "Greenhouse"
    }

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError> {
        let url = api_url(&req.locator)?;
        let board: Board = http.get_json(&url).await?;
        let jobs = parse_board(board, req);
        debug!(company = %req.company_name, count = jobs.len(), "greenhouse board parsed");
        Ok(jobs)
    }
}
