use std::fmt;
use std::sync::Arc;

use jobcrawl_adapters::{AdapterRegistry, ScrapeRequest, SourceAdapter};
use jobcrawl_core::CompanyRow;
use jobcrawl_storage::rate_limit_key;
use thiserror::Error;

/// Why a directory row was left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("No career page")]
    MissingLocator,
    #[error("No ATS platform")]
    MissingLabel,
    #[error("No scraper for {0}")]
    NoAdapterForLabel(String),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingLocator => "missing_locator",
            RejectReason::MissingLabel => "missing_label",
            RejectReason::NoAdapterForLabel(_) => "no_adapter_for_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub company: String,
    pub reason: RejectReason,
}

/// One company bound to its adapter and pacing key. Consumed once by a worker.
#[derive(Clone)]
pub struct Task {
    company: CompanyRow,
    adapter_key: String,
    adapter: Arc<dyn SourceAdapter>,
    host_key: String,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("company", &self.company.name)
            .field("adapter_key", &self.adapter_key)
            .field("host_key", &self.host_key)
            .finish()
    }
}

impl Task {
    pub fn company(&self) -> &CompanyRow {
        &self.company
    }

    pub fn company_name(&self) -> &str {
        &self.company.name
    }

    pub fn adapter_key(&self) -> &str {
        &self.adapter_key
    }

    pub fn adapter(&self) -> &Arc<dyn SourceAdapter> {
        &self.adapter
    }

    pub fn host_key(&self) -> &str {
        &self.host_key
    }

    pub fn scrape_request(&self, page_delay: std::time::Duration) -> ScrapeRequest {
        ScrapeRequest {
            locator: self.company.career_page.trim().to_string(),
            company_name: self.company.name.clone(),
            company_description: self.company.description.clone(),
            label: self.company.label.clone(),
            page_delay,
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskBatch {
    pub tasks: Vec<Task>,
    pub rejected: Vec<Rejection>,
}

pub fn build_task(row: CompanyRow, registry: &AdapterRegistry) -> Result<Task, Rejection> {
    let reject = |reason| Rejection {
        company: row.name.clone(),
        reason,
    };
    if !row.has_locator() {
        return Err(reject(RejectReason::MissingLocator));
    }
    if !row.has_label() {
        return Err(reject(RejectReason::MissingLabel));
    }
    let Some((key, adapter)) = registry.resolve(&row.label) else {
        return Err(reject(RejectReason::NoAdapterForLabel(row.label.trim().to_string())));
    };

    Ok(Task {
        adapter_key: key.to_string(),
        adapter,
        host_key: rate_limit_key(&row.career_page),
        company: row,
    })
}

pub fn build_tasks(
    rows: impl IntoIterator<Item = CompanyRow>,
    registry: &AdapterRegistry,
) -> TaskBatch {
    let mut batch = TaskBatch::default();
    for row in rows {
        match build_task(row, registry) {
            Ok(task) => batch.tasks.push(task),
            Err(rejection) => batch.rejected.push(rejection),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, career_page: &str, label: &str) -> CompanyRow {
        CompanyRow {
            name: name.to_string(),
            career_page: career_page.to_string(),
            label: label.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rows_are_bound_or_rejected_with_codes() {
        let registry = AdapterRegistry::builtin();
        let batch = build_tasks(
            vec![
                row("Acme", "https://boards.greenhouse.io/acme", "Greenhouse"),
                row("Globex", " ", "Lever"),
                row("Initech", "https://initech.example/jobs", ""),
                row("Umbrella", "https://umbrella.example/jobs", "Taleo"),
            ],
            &registry,
        );

        assert_eq!(batch.tasks.len(), 1);
        let task = &batch.tasks[0];
        assert_eq!(task.company_name(), "Acme");
        assert_eq!(task.adapter_key(), "greenhouse");
        assert_eq!(task.host_key(), "boards.greenhouse.io");

        let codes: Vec<_> =
            batch.rejected.iter().map(|r| (r.company.as_str(), r.reason.code())).collect();
        assert_eq!(
            codes,
            vec![
                ("Globex", "missing_locator"),
                ("Initech", "missing_label"),
                ("Umbrella", "no_adapter_for_label"),
            ]
        );
        assert_eq!(batch.rejected[2].reason.to_string(), "No scraper for Taleo");
    }

    #[test]
    fn scrape_request_carries_company_metadata() {
        let registry = AdapterRegistry::builtin();
        let mut company = row("Acme", " https://jobs.lever.co/acme ", "lever");
        company.description = "Rockets".to_string();
        let task = build_task(company, &registry).expect("task");

        let req = task.scrape_request(std::time::Duration::ZERO);
        assert_eq!(req.locator, "https://jobs.lever.co/acme");
        assert_eq!(req.company_description, "Rockets");
        assert_eq!(req.label, "lever");
    }
}
