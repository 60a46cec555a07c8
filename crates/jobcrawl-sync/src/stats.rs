use std::collections::{BTreeMap, HashSet};

use jobcrawl_core::JobRecord;
use serde::Serialize;

const TOP_N: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub total: usize,
    pub unique_companies: usize,
    pub unique_locations: usize,
    /// Highest counts first, ties alphabetical.
    pub top_labels: Vec<(String, usize)>,
    pub top_companies: Vec<(String, usize)>,
}

impl CorpusStats {
    pub fn compute(records: &[JobRecord]) -> Self {
        let mut labels: BTreeMap<&str, usize> = BTreeMap::new();
        let mut companies: BTreeMap<&str, usize> = BTreeMap::new();
        let mut locations: HashSet<&str> = HashSet::new();

        for record in records {
            *companies.entry(record.company_name.as_str()).or_default() += 1;
            if !record.label.is_empty() {
                *labels.entry(record.label.as_str()).or_default() += 1;
            }
            if !record.location.is_empty() {
                locations.insert(record.location.as_str());
            }
        }

        Self {
            total: records.len(),
            unique_companies: companies.len(),
            unique_locations: locations.len(),
            top_labels: top(labels),
            top_companies: top(companies),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let rule = "=".repeat(60);
        let mut out = vec![
            String::new(),
            rule.clone(),
            "📊 JOB DATABASE STATISTICS".to_string(),
            rule.clone(),
            format!("Total jobs: {}", self.total),
            format!("Unique companies: {}", self.unique_companies),
            format!("Unique locations: {}", self.unique_locations),
            String::new(),
            "📦 Jobs by ATS Platform:".to_string(),
        ];
        out.extend(self.top_labels.iter().map(|(label, n)| format!("   {label}: {n}")));
        out.push(String::new());
        out.push("🏢 Top Companies by Job Count:".to_string());
        out.extend(self.top_companies.iter().map(|(company, n)| format!("   {company}: {n}")));
        out.push(rule);
        out
    }
}

fn top(counts: BTreeMap<&str, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> =
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    // BTreeMap order is alphabetical and the sort is stable.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(TOP_N);
    ranked
}
