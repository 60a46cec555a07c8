//! Core domain model for jobcrawl: directory rows and normalized job records.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobcrawl-core";

/// Column headers of the persisted corpus, in file order.
pub const CORPUS_COLUMNS: [&str; 13] = [
    "Company Name",
    "Job Title",
    "Location",
    "Job Link",
    "Job Description",
    "Employment Type",
    "Department",
    "Posted Date",
    "Company Description",
    "Remote",
    "Label",
    "ATS",
    "Scraped Date",
];

/// One schedulable row of the company directory, after schema normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompanyRow {
    pub name: String,
    pub website: String,
    /// Source locator understood by exactly one adapter.
    pub career_page: String,
    /// Adapter selector.
    pub label: String,
    pub description: String,
}

impl CompanyRow {
    pub fn has_locator(&self) -> bool {
        !self.career_page.trim().is_empty()
    }

    pub fn has_label(&self) -> bool {
        !self.label.trim().is_empty()
    }
}

/// Remote/hybrid/onsite marker carried on every job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteFlag {
    Remote,
    Hybrid,
    Onsite,
    #[default]
    Unknown,
}

impl RemoteFlag {
    /// Infer the flag from free text such as a location string or workplace type.
    pub fn infer(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        if lower.contains("hybrid") {
            RemoteFlag::Hybrid
        } else if lower.contains("remote") {
            RemoteFlag::Remote
        } else if lower.trim().is_empty() {
            RemoteFlag::Unknown
        } else {
            RemoteFlag::Onsite
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteFlag::Remote => "Yes",
            RemoteFlag::Hybrid => "Hybrid",
            RemoteFlag::Onsite => "No",
            RemoteFlag::Unknown => "",
        }
    }
}

impl From<String> for RemoteFlag {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "yes" | "remote" | "true" => RemoteFlag::Remote,
            "hybrid" => RemoteFlag::Hybrid,
            "no" | "onsite" | "on-site" | "false" => RemoteFlag::Onsite,
            _ => RemoteFlag::Unknown,
        }
    }
}

impl From<RemoteFlag> for String {
    fn from(value: RemoteFlag) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RemoteFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized adapter output and the row shape of the persisted corpus.
///
/// `link` is the identity key. Records with an empty link cannot be
/// deduplicated and are always treated as new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct JobRecord {
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Job Title")]
    pub title: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Job Link")]
    pub link: String,
    #[serde(rename = "Job Description")]
    pub description: String,
    #[serde(rename = "Employment Type")]
    pub employment_type: String,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Posted Date")]
    pub posted_date: String,
    #[serde(rename = "Company Description")]
    pub company_description: String,
    #[serde(rename = "Remote")]
    pub remote: RemoteFlag,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "ATS")]
    pub source: String,
    /// `YYYY-MM-DD` of the run that last observed this record.
    #[serde(rename = "Scraped Date")]
    pub scraped_date: String,
}

impl JobRecord {
    pub fn new(
        company_name: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            title: title.into(),
            link: link.into(),
            ..Default::default()
        }
    }

    /// The deduplication key, if this record has a usable one.
    pub fn canonical_link(&self) -> Option<&str> {
        let link = self.link.trim();
        if link.is_empty() {
            None
        } else {
            Some(link)
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_employment_type(mut self, employment_type: impl Into<String>) -> Self {
        self.employment_type = employment_type.into();
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    /// Keeps only the date part of an ISO-8601 timestamp.
    pub fn with_posted_date(mut self, posted: &str) -> Self {
        self.posted_date = posted.split('T').next().unwrap_or_default().trim().to_string();
        self
    }

    pub fn with_remote(mut self, remote: RemoteFlag) -> Self {
        self.remote = remote;
        self
    }

    /// Stamps the company metadata and source label every adapter must carry through.
    pub fn with_origin(
        mut self,
        company_description: impl Into<String>,
        label: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        self.company_description = company_description.into();
        self.label = label.into();
        self.source = source.into();
        self
    }
}
