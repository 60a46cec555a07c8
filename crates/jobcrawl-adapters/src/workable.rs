use async_trait::async_trait;
use jobcrawl_core::{JobRecord, RemoteFlag};
use jobcrawl_storage::HttpFetcher;
use serde::Deserialize;
use tracing::debug;

use crate::{board_slug, join_non_empty, nullable, AdapterError, ScrapeRequest, SourceAdapter};

const WIDGET_PATH: &str = "/api/v1/widget/accounts/";

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkableAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Account {
    #[serde(deserialize_with = "nullable")]
    jobs: Vec<Posting>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Posting {
    #[serde(deserialize_with = "nullable")]
    title: String,
    #[serde(deserialize_with = "nullable")]
    url: String,
    #[serde(deserialize_with = "nullable")]
    locations: Vec<Place>,
    #[serde(deserialize_with = "nullable")]
    city: String,
    #[serde(deserialize_with = "nullable")]
    employment_type: String,
    #[serde(deserialize_with = "nullable")]
    department: String,
    #[serde(deserialize_with = "nullable")]
    function: String,
    #[serde(deserialize_with = "nullable")]
    published_on: String,
    #[serde(deserialize_with = "nullable")]
    telecommuting: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Place {
    #[serde(deserialize_with = "nullable")]
    city: String,
    #[serde(deserialize_with = "nullable")]
    country: String,
}

pub(crate) fn api_url(locator: &str) -> Result<String, AdapterError> {
    if locator.contains(WIDGET_PATH) {
        return Ok(locator.trim().to_string());
    }
    let slug = board_slug(locator)
        .ok_or_else(|| AdapterError::InvalidLocator(locator.to_string()))?;
    Ok(format!("https://apply.workable.com{WIDGET_PATH}{slug}"))
}

pub(crate) fn parse_account(account: Account, req: &ScrapeRequest) -> Vec<JobRecord> {
    account
        .jobs
        .into_iter()
        .map(|posting| {
            let mut location = posting
                .locations
                .first()
                .map(|place| join_non_empty([place.city.as_str(), place.country.as_str()]))
                .unwrap_or_default();
            if location.is_empty() {
                location = posting.city.clone();
            }
            let department = if posting.department.is_empty() {
                posting.function
            } else {
                posting.department
            };
            let remote = if posting.telecommuting {
                RemoteFlag::Remote
            } else {
                RemoteFlag::Onsite
            };

            JobRecord::new(&req.company_name, posting.title, posting.url)
                .with_location(location)
                .with_employment_type(posting.employment_type)
                .with_department(department)
                .with_posted_date(&posting.published_on)
                .with_remote(remote)
                .with_origin(&req.company_description, &req.label, "Workable")
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for WorkableAdapter {
    fn name(&self) -> &'static str {
        "Workable"
    }

    async fn scrape_jobs(
        &self,
        http: &HttpFetcher,
        req: &ScrapeRequest,
    ) -> Result<Vec<JobRecord>, AdapterError> {
        let account: Account = http.get_json(&api_url(&req.locator)?).await?;
        let jobs = parse_account(account, req);
        debug!(company = %req.company_name, count = jobs.len(), "workable account parsed");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_from_career_page() {
        assert_eq!(
            api_url("https://apply.workable.com/soda-data-nv/").unwrap(),
            "https://apply.workable.com/api/v1/widget/accounts/soda-data-nv"
        );
    }

    #[test]
    fn fixture_account_maps_to_records() {
        let req = ScrapeRequest {
            company_name: "Soda".to_string(),
            company_description: "Data quality".to_string(),
            label: "Workable".to_string(),
            ..Default::default()
        };
        let account: Account =
            serde_json::from_str(include_str!("../fixtures/workable.json")).expect("fixture");
        let jobs = parse_account(account, &req);

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].location, "Brussels, Belgium");
        assert_eq!(jobs[0].department, "Engineering");
        assert_eq!(jobs[0].posted_date, "2026-10-03");
        assert_eq!(jobs[0].remote, RemoteFlag::Onsite);

        assert_eq!(jobs[1].location, "Lisbon");
        assert_eq!(jobs[1].department, "Customer");
        assert_eq!(jobs[1].remote, RemoteFlag::Remote);
        assert_eq!(jobs[1].company_description, "Data quality");
    }
}
