use async_trait::async_trait;
use jobcrawl_core::{JobRecord, RemoteFlag};
use jobcrawl_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;

use crate::{board_slug, nullable, AdapterError, ScrapeRequest, SourceAdapter};

#[derive(Debug, Clone, Copy, Default)]
pub struct AshbyAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Board {
    #[serde(deserialize_with = "nullable")]
    jobs: Vec<Posting>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Posting {
    #[serde(deserialize_with = "nullable")]
    title: String,
    #[serde(deserialize_with = "nullable")]
    location: String,
    #[serde(deserialize_with = "nullable")]
    job_url: String,
    #[serde(deserialize_with = "nullable")]
    description_plain: String,
    #[serde(deserialize_with = "nullable")]
    employment_type: String,
    #[serde(deserialize_with = "nullable")]
    department: String,
    #[serde(deserialize_with = "nullable")]
    published_at: String,
    #[serde(deserialize_with = "nullable")]
    is_remote: bool,
}

pub(crate) fn api_url(locator: &str) -> Result<String, AdapterError> {
    let slug = board_slug(locator)
        .ok_or_else(|| AdapterError::InvalidLocator(locator.to_string()))?;
    Ok(format!("https://api.ashbyhq.com/posting-api/job-board/{slug}?includeCompensation=true"))
}

pub(crate) fn parse_board(board: Board, req: &ScrapeRequest) -> Vec<JobRecord> {
    board
        .jobs
        .into_iter()
        .map(|posting| {
            let remote = if posting.is_remote { RemoteFlag::Remote } else { RemoteFlag::Onsite };
            JobRecord::new(&req.company_name, posting.title, posting.job_url)
                .with_location(posting.location)
                .with_description(posting.description_plain.trim())
                .with_employment_type(posting.employment_type)
                .with_department(posting.department)
                .with_posted_date(&posting.published_at)
                .with_remote(remote)
                .with_origin(&req.company_description, &req.label, "Ashby")
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for AshbyAdapter {
    fn name(&self) -> &'static str {
        "Ashby"
    }

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError> {
        let board: Board = http.get_json(&api_url(&req.locator)?).await?;
        let jobs = parse_board(board, req);
        debug!(company = %req.company_name, count = jobs.len(), "ashby board parsed");
        Ok(jobs)
    }
}
