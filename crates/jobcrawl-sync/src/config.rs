use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use jobcrawl_core::JobRecord;
use serde::Deserialize;

/// Hard ceiling on concurrent workers regardless of host parallelism.
pub const MAX_WORKERS_CAP: usize = 8;

/// Highest highlight-rules file format this build understands.
pub const HIGHLIGHT_RULES_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    /// Minimum spacing between request starts to the same host.
    pub delay: Duration,
    pub max_workers: usize,
    pub http_timeout: Duration,
    /// Upper bound on one task's adapter call.
    pub task_timeout: Duration,
    pub user_agent: String,
    pub limit: Option<usize>,
    pub highlight_rules_path: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("./data/job_search.csv"),
            output_dir: PathBuf::from("./data"),
            delay: Duration::from_millis(200),
            max_workers: default_max_workers(),
            http_timeout: Duration::from_secs(15),
            task_timeout: Duration::from_secs(300),
            user_agent: "Mozilla/5.0 (compatible; jobcrawl/0.1)".to_string(),
            limit: None,
            highlight_rules_path: None,
        }
    }
}

impl CrawlConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            input_path: defaults.input_path,
            output_dir: std::env::var("JOBCRAWL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            delay: env_f64("JOBCRAWL_DELAY_SECS")
                .and_then(|v| Duration::try_from_secs_f64(v.max(0.0)).ok())
                .unwrap_or(defaults.delay),
            max_workers: std::env::var("JOBCRAWL_MAX_WORKERS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .map(|v| v.max(1))
                .unwrap_or(defaults.max_workers),
            http_timeout: env_u64("JOBCRAWL_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            task_timeout: env_u64("JOBCRAWL_TASK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_timeout),
            user_agent: std::env::var("JOBCRAWL_USER_AGENT").unwrap_or(defaults.user_agent),
            limit: None,
            highlight_rules_path: std::env::var("JOBCRAWL_HIGHLIGHT_RULES").ok().map(PathBuf::from),
        }
    }
}

/// `max(1, min(8, available parallelism))`.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_WORKERS_CAP)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Title/location filter pair for the highlighted report sections.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HighlightRules {
    #[serde(default = "default_rules_version")]
    pub version: u32,
    #[serde(default)]
    pub heading: Option<String>,
    #[serde(default)]
    pub title_contains_any: Vec<String>,
    #[serde(default)]
    pub location_contains_any: Vec<String>,
}

impl Default for HighlightRules {
    fn default() -> Self {
        Self {
            version: HIGHLIGHT_RULES_VERSION,
            heading: Some("STUDENT JOBS".to_string()),
            title_contains_any: vec!["student".into(), "intern".into(), "praktikum".into()],
            location_contains_any: vec!["berlin".into(), "germany".into(), "deutschland".into()],
        }
    }
}

impl HighlightRules {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rules: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        if rules.version == 0 || rules.version > HIGHLIGHT_RULES_VERSION {
            bail!(
                "unsupported highlight rules version {} in {}",
                rules.version,
                path.display()
            );
        }
        Ok(rules)
    }

    pub fn heading(&self) -> &str {
        self.heading.as_deref().unwrap_or("HIGHLIGHTED JOBS")
    }

    /// Both filters must hit. An empty filter list matches everything.
    pub fn matches(&self, job: &JobRecord) -> bool {
        contains_any(&job.title, &self.title_contains_any)
            && contains_any(&job.location, &self.location_contains_any)
    }
}

fn default_rules_version() -> u32 {
    HIGHLIGHT_RULES_VERSION
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    if needles.is_empty() {
        return true;
    }
    let haystack = haystack.to_lowercase();
    needles.iter().any(|needle| haystack.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_default_is_capped() {
        let workers = default_max_workers();
        assert!((1..=MAX_WORKERS_CAP).contains(&workers));
    }

    #[test]
    fn default_rules_need_title_and_location() {
        let rules = HighlightRules::default();
        let hit = JobRecord::new("Acme", "Werkstudent / Student Assistant", "l")
            .with_location("Berlin, Germany");
        let wrong_city = JobRecord::new("Acme", "Intern Marketing", "l").with_location("Paris");
        let wrong_title = JobRecord::new("Acme", "Senior Engineer", "l").with_location("Berlin");

        assert!(rules.matches(&hit));
        assert!(!rules.matches(&wrong_city));
        assert!(!rules.matches(&wrong_title));
    }

    #[test]
    fn rules_load_from_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("highlight.yaml");
        std::fs::write(
            &path,
            "version: 1\nheading: RUST JOBS\n\
             title_contains_any: [rust]\nlocation_contains_any: []\n",
        )
        .expect("write rules");

        let rules = HighlightRules::load(&path).expect("load");
        assert_eq!(rules.heading(), "RUST JOBS");
        let job = JobRecord::new("Acme", "Rust Engineer", "l").with_location("Anywhere");
        assert!(rules.matches(&job));
    }

    #[test]
    fn rules_with_unknown_version_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("highlight.yaml");
        std::fs::write(&path, "version: 7\ntitle_contains_any: [rust]\n").expect("write rules");

        let err = HighlightRules::load(&path).expect_err("version 7");
        assert!(err.to_string().contains("unsupported highlight rules version 7"));

        std::fs::write(&path, "title_contains_any: [rust]\n").expect("write rules");
        assert_eq!(HighlightRules::load(&path).expect("implicit version").version, 1);
    }
}
