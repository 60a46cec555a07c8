//! Company directory ingestion.
//!
//! Two header layouts are in circulation: `Name, Website, Career Page, Label,
//! Description` and `Website, Career Page, Label, Active`. Both normalize into
//! [`CompanyRow`] here so nothing downstream branches on the layout.

use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;
use jobcrawl_core::CompanyRow;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryLoad {
    pub rows: Vec<CompanyRow>,
    pub total_rows: usize,
    pub inactive_skipped: usize,
}

pub async fn load_companies(path: &Path) -> Result<DirectoryLoad> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading company directory {}", path.display()))?;
    let load = parse_companies(bytes.as_slice())
        .with_context(|| format!("parsing {}", path.display()))?;
    if load.inactive_skipped > 0 {
        info!(
            active = load.rows.len(),
            total = load.total_rows,
            "filtered directory to active companies"
        );
    }
    Ok(load)
}

pub fn parse_companies(reader: impl std::io::Read) -> Result<DirectoryLoad> {
    let mut csv = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
    let headers = csv.headers().context("reading directory header")?.clone();
    let columns = Columns::from_headers(&headers);

    for (required, present) in [
        ("Career Page", columns.career_page.is_some()),
        ("Label", columns.label.is_some()),
        ("Name", columns.name.is_some() || columns.website.is_some()),
    ] {
        if !present {
            warn!(column = required, "directory is missing a required column");
        }
    }

    let mut load = DirectoryLoad::default();
    for record in csv.records() {
        let record = record.context("reading directory row")?;
        load.total_rows += 1;

        if let Some(idx) = columns.active {
            let flag = record.get(idx).unwrap_or_default();
            if !flag.eq_ignore_ascii_case("active") {
                load.inactive_skipped += 1;
                continue;
            }
        }

        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i)).unwrap_or_default().to_string()
        };
        let website = field(columns.website);
        let mut name = field(columns.name);
        if name.is_empty() {
            name = display_name_from_website(&website);
        }

        load.rows.push(CompanyRow {
            name,
            website,
            career_page: field(columns.career_page),
            label: field(columns.label),
            description: field(columns.description),
        });
    }
    Ok(load)
}

#[derive(Debug, Default)]
struct Columns {
    name: Option<usize>,
    website: Option<usize>,
    career_page: Option<usize>,
    label: Option<usize>,
    description: Option<usize>,
    active: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut columns = Self::default();
        for (idx, header) in headers.iter().enumerate() {
            let slot = match header.trim().to_ascii_lowercase().as_str() {
                "name" => &mut columns.name,
                "website" => &mut columns.website,
                "career page" => &mut columns.career_page,
                "label" => &mut columns.label,
                "description" => &mut columns.description,
                "active" => &mut columns.active,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        columns
    }
}

/// `https://www.acme-labs.io/about` -> `Acme-labs`.
pub fn display_name_from_website(website: &str) -> String {
    let host = website
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or_default();
    let label = host.split('.').next().unwrap_or_default();

    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_schema_keeps_names_and_descriptions() {
        let csv = "Name,Website,Career Page,Label,Description\n\
                   Acme,https://acme.io,https://boards.greenhouse.io/acme,Greenhouse,Rockets\n\
                   Globex,https://globex.com,,Lever,\n";
        let load = parse_companies(csv.as_bytes()).expect("parse");

        assert_eq!(load.total_rows, 2);
        assert_eq!(load.inactive_skipped, 0);
        assert_eq!(load.rows[0].name, "Acme");
        assert_eq!(load.rows[0].description, "Rockets");
        assert!(load.rows[0].has_locator());
        assert!(!load.rows[1].has_locator());
    }

    #[test]
    fn website_schema_derives_names_and_filters_inactive() {
        let csv = "Website,Career Page,Label,Active\n\
                   https://www.acme.io/en,https://jobs.lever.co/acme,Lever,Active\n\
                   https://globex.com,https://apply.workable.com/globex,Workable,inactive\n\
                   http://initech.de,https://initech.recruitee.com,Recruitee, ACTIVE \n";
        let load = parse_companies(csv.as_bytes()).expect("parse");

        assert_eq!(load.total_rows, 3);
        assert_eq!(load.inactive_skipped, 1);
        assert_eq!(
            load.rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["Acme", "Initech"]
        );
        assert_eq!(load.rows[0].description, "");
    }

    #[test]
    fn website_names_are_capitalized_first_labels() {
        assert_eq!(display_name_from_website("https://www.acme-labs.io/about"), "Acme-labs");
        assert_eq!(display_name_from_website("GLOBEX.com"), "Globex");
        assert_eq!(display_name_from_website(""), "Unknown");
    }
}
