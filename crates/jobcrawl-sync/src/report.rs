//! Change report rendering.
//!
//! Console output and the saved artifact are both produced from
//! [`RunReport::lines`], so what is shown and what is saved never diverge.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use jobcrawl_core::JobRecord;
use tokio::fs;
use tracing::info;

use crate::config::HighlightRules;
use crate::diff::SnapshotDiff;
use crate::history::{TimingTrend, Trend};
use crate::tracker::{
    IssueEntry, NoResultCompany, ProblemCompany, RequestStats, RunTracker, SlowCompany,
    TimingSummary, TrackerConfig,
};

const RULE: usize = 80;
const NO_RESULT_PREVIEW: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub generated_at: String,
    pub interrupted: bool,
    pub diff: SnapshotDiff,
    pub highlight_heading: String,
    pub highlighted_added: Vec<JobRecord>,
    pub highlighted_removed: Vec<JobRecord>,
    pub no_results: Vec<NoResultCompany>,
    pub problems: Vec<ProblemCompany>,
    pub stats: RequestStats,
    pub recent_issues: Vec<IssueEntry>,
    pub current_delay: Duration,
    pub delay_recommendation: Option<Duration>,
    pub timing: Option<TimingSummary>,
    pub trend: Option<TimingTrend>,
    pub slow: Vec<SlowCompany>,
    /// Elapsed time above which a company lands in `slow`.
    pub slow_threshold: Duration,
}

impl RunReport {
    pub fn new(generated_at: impl Into<String>, diff: SnapshotDiff) -> Self {
        Self {
            generated_at: generated_at.into(),
            diff,
            slow_threshold: TrackerConfig::default().slow_listing,
            ..Default::default()
        }
    }

    /// Keeps the added and removed records that match `rules`.
    pub fn with_highlights(
        mut self,
        rules: &HighlightRules,
        before: &[JobRecord],
        after: &[JobRecord],
    ) -> Self {
        self.highlight_heading = rules.heading().to_string();
        self.highlighted_added = self
            .diff
            .added_records(after)
            .into_iter()
            .filter(|job| rules.matches(job))
            .cloned()
            .collect();
        self.highlighted_removed = self
            .diff
            .removed_records(before)
            .into_iter()
            .filter(|job| rules.matches(job))
            .cloned()
            .collect();
        self
    }

    pub fn with_tracker(mut self, tracker: &RunTracker, current_delay: Duration) -> Self {
        self.no_results = tracker.no_result_companies();
        self.problems = tracker.problem_companies();
        self.stats = tracker.stats();
        self.recent_issues = tracker.recent_issues();
        self.current_delay = current_delay;
        self.delay_recommendation = tracker.delay_recommendation(current_delay);
        self.timing = tracker.timing_summary();
        self.slow_threshold = tracker.config().slow_listing;
        self.slow = tracker.slow_companies(self.slow_threshold);
        self
    }

    pub fn with_trend(mut self, trend: Option<TimingTrend>) -> Self {
        self.trend = trend;
        self
    }

    pub fn interrupted(mut self, interrupted: bool) -> Self {
        self.interrupted = interrupted;
        self
    }

    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.push_header(&mut out);
        self.push_summary(&mut out);
        if !self.highlighted_added.is_empty() {
            let heading = format!("🎓 NEW {}", self.highlight_heading);
            push_jobs(&mut out, &heading, &self.highlighted_added);
        }
        if !self.highlighted_removed.is_empty() {
            let heading = format!("❌ REMOVED {}", self.highlight_heading);
            push_jobs(&mut out, &heading, &self.highlighted_removed);
        }
        if !self.no_results.is_empty() {
            self.push_no_results(&mut out);
        }
        if !self.problems.is_empty() {
            self.push_problems(&mut out);
        }
        if !self.recent_issues.is_empty() {
            self.push_request_issues(&mut out);
        }
        if let Some(timing) = &self.timing {
            self.push_timing(&mut out, timing);
        }
        out
    }

    fn push_header(&self, out: &mut Vec<String>) {
        out.push(String::new());
        out.push("=".repeat(RULE));
        out.push("📊 JOB CHANGES REPORT".to_string());
        out.push("=".repeat(RULE));
        out.push(format!("📅 Generated: {}", self.generated_at));
        if self.interrupted {
            out.push("⚠️  Interrupted - partial results saved".to_string());
        }
        out.push(String::new());
    }

    fn push_summary(&self, out: &mut Vec<String>) {
        let diff = &self.diff;
        out.push(format!("📦 Previous: {} jobs", diff.before_total));
        out.push(format!("📦 Current:  {} jobs", diff.after_total));
        out.push(format!("📈 Net change: {:+} jobs", diff.net_change()));
        out.push(String::new());
        out.push(format!("🆕 New jobs:     {}", diff.added.len()));
        out.push(format!("❌ Removed jobs: {}", diff.removed.len()));
        out.push(format!("✓  Unchanged:    {}", diff.unchanged.len()));
        out.push("=".repeat(RULE));
    }

    fn push_no_results(&self, out: &mut Vec<String>) {
        out.push(String::new());
        out.push(format!("ℹ️  COMPANIES WITH NO JOBS - NORMAL ({}):", self.no_results.len()));
        out.push("-".repeat(RULE));
        out.push(
            "(These companies' scrapers work fine, they just don't have job openings)".to_string(),
        );
        for company in self.no_results.iter().take(NO_RESULT_PREVIEW) {
            out.push(format!("  • {} ({})", company.company, company.elapsed));
        }
        if self.no_results.len() > NO_RESULT_PREVIEW {
            out.push(format!(
                "  ... and {} more companies",
                self.no_results.len() - NO_RESULT_PREVIEW
            ));
        }
        out.push("-".repeat(RULE));
    }

    fn push_problems(&self, out: &mut Vec<String>) {
        out.push(String::new());
        out.push(format!("❌ COMPANIES WITH ACTUAL PROBLEMS ({}):", self.problems.len()));
        out.push("-".repeat(RULE));
        out.push("(These need investigation - technical issues, not just no jobs)".to_string());
        for problem in &self.problems {
            out.push(format!("  • {}: {}", problem.company, problem.reason));
        }
        out.push("-".repeat(RULE));
    }

    fn push_request_issues(&self, out: &mut Vec<String>) {
        let stats = &self.stats;
        let current = format_secs(self.current_delay);
        out.push(String::new());
        out.push("⚡ REQUEST ISSUES & RATE LIMITING:".to_string());
        out.push("-".repeat(RULE));
        out.push(format!("📊 Request Stats (Current delay: {current}s):"));
        out.push(format!("  • Total requests: {}", stats.total));
        out.push(format!("  • Successful: {}", stats.successful));
        out.push(format!("  • Rate limited: {}", stats.rate_limited));
        out.push(format!("  • Timeouts: {}", stats.timeouts));
        out.push(format!("  • Connection errors: {}", stats.connection_errors));
        out.push(format!("  • Other errors: {}", stats.generic_errors));

        if let Some(recommended) = self.delay_recommendation {
            out.push(String::new());
            out.push(format!(
                "⚡ RECOMMENDATION: Increase delay from {current}s to {}s",
                format_secs(recommended)
            ));
        }

        out.push(String::new());
        out.push("🔍 Recent Issues:".to_string());
        for issue in &self.recent_issues {
            let status = issue.status.map(|s| format!(" (Status: {s})")).unwrap_or_default();
            out.push(format!(
                "  • {} - {}: {}{status}",
                issue.timestamp, issue.company, issue.kind
            ));
        }
        out.push("-".repeat(RULE));
    }

    fn push_timing(&self, out: &mut Vec<String>, timing: &TimingSummary) {
        out.push(String::new());
        out.push("⏱️  TIMING STATISTICS:".to_string());
        out.push("-".repeat(RULE));
        out.push("📊 Summary:".to_string());
        out.push(format!("  • Total scraping time: {:.1}s", timing.total_secs));
        out.push(format!("  • Average per company: {:.1}s", timing.avg_secs));
        out.push(format!("  • Fastest company: {:.1}s", timing.min_secs));
        out.push(format!("  • Slowest company: {:.1}s", timing.max_secs));
        out.push(format!("  • Average jobs per company: {:.0}", timing.avg_jobs));

        if let Some(trend) = &self.trend {
            let marker = match trend.trend {
                Trend::Slower => "📈",
                Trend::Faster => "📉",
                Trend::Stable => "➡️",
            };
            out.push(String::new());
            out.push("📊 Performance Trend vs Last Run:".to_string());
            out.push(format!(
                "  {marker} {} ({:+.1}%)",
                trend.trend.as_str().to_uppercase(),
                trend.change_percent
            ));
            out.push(format!("  • Previous avg: {:.1}s", trend.previous_avg));
            out.push(format!("  • Current avg: {:.1}s", trend.current_avg));
        }

        if !self.slow.is_empty() {
            out.push(String::new());
            out.push(format!("🐌 Slow Companies (>{}s):", whole_secs(self.slow_threshold)));
            for slow in &self.slow {
                let rate = if slow.job_count > 0 {
                    format!(" ({:.1} jobs/sec)", slow.jobs_per_sec())
                } else {
                    String::new()
                };
                out.push(format!(
                    "  • {}: {:.1}s for {} jobs{rate}",
                    slow.company, slow.elapsed_secs, slow.job_count
                ));
            }
        }
        out.push("-".repeat(RULE));
    }
}

fn push_jobs(out: &mut Vec<String>, heading: &str, jobs: &[JobRecord]) {
    out.push(String::new());
    out.push(format!("{heading} ({}):", jobs.len()));
    out.push("-".repeat(RULE));
    for job in jobs {
        out.push(format!("  • {}", or_unknown(&job.title)));
        out.push(format!(
            "    @ {} | {}",
            or_unknown(&job.company_name),
            or_unknown(&job.location)
        ));
        let link = job.canonical_link().unwrap_or("No link available");
        out.push(format!("    🔗 {link}"));
        out.push(String::new());
    }
    out.push("-".repeat(RULE));
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "Unknown"
    } else {
        value
    }
}

/// `0.2`, `1.0`, `1.5`: seconds with at least one decimal, at most three.
pub fn format_secs(duration: Duration) -> String {
    let secs = (duration.as_secs_f64() * 1000.0).round() / 1000.0;
    if secs.fract() == 0.0 {
        format!("{secs:.1}")
    } else {
        format!("{secs}")
    }
}

fn whole_secs(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format_secs(duration)
    }
}

/// Streams the rendered lines to the console log.
pub fn emit_console(lines: &[String]) {
    for line in lines {
        info!(target: "jobcrawl::report", "{line}");
    }
}

pub fn report_file_name(date: NaiveDate) -> String {
    format!("job_changes_{}.txt", date.format("%Y-%m-%d"))
}

/// Writes the lines to `job_changes_YYYY-MM-DD.txt` under `dir`.
/// A second run on the same day overwrites.
pub async fn save(lines: &[String], dir: &Path, date: NaiveDate) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(report_file_name(date));
    fs::write(&path, lines.join("\n"))
        .await
        .with_context(|| format!("writing report {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ExecutionResult;
    use crate::tracker::IssueKind;

    fn job(title: &str, location: &str, link: &str) -> JobRecord {
        JobRecord::new("Acme", title, link).with_location(location)
    }

    fn sample() -> RunReport {
        let before = vec![
            job("Working Student Data", "Berlin", "https://acme.io/1"),
            job("Engineer", "Berlin", "https://acme.io/2"),
        ];
        let after = vec![
            job("Engineer", "Berlin", "https://acme.io/2"),
            job("Intern Marketing", "Berlin, Germany", "https://acme.io/3"),
            job("Intern Sales", "Paris", "https://acme.io/4"),
        ];
        let diff = SnapshotDiff::compute(&before, &after);
        RunReport::new("2026-10-17 09:30:00", diff).with_highlights(
            &HighlightRules::default(),
            &before,
            &after,
        )
    }

    #[test]
    fn summary_and_highlights() {
        let lines = sample().lines();

        assert_eq!(lines[0], "");
        assert_eq!(lines[2], "📊 JOB CHANGES REPORT");
        assert!(lines.contains(&"📦 Previous: 2 jobs".to_string()));
        assert!(lines.contains(&"📈 Net change: +1 jobs".to_string()));
        assert!(lines.contains(&"🆕 New jobs:     2".to_string()));
        assert!(lines.contains(&"❌ Removed jobs: 1".to_string()));
        assert!(lines.contains(&"✓  Unchanged:    1".to_string()));
        assert!(lines.contains(&"🎓 NEW STUDENT JOBS (1):".to_string()));
        assert!(lines.contains(&"  • Intern Marketing".to_string()));
        assert!(lines.contains(&"    @ Acme | Berlin, Germany".to_string()));
        assert!(lines.contains(&"❌ REMOVED STUDENT JOBS (1):".to_string()));
        assert!(!lines.iter().any(|l| l.contains("Intern Sales")));
        assert!(!lines.iter().any(|l| l.contains("TIMING STATISTICS")));
        assert!(!lines.iter().any(|l| l.contains("RATE LIMITING")));
    }

    #[test]
    fn no_result_list_is_truncated() {
        let mut report = sample();
        report.no_results = (0..23)
            .map(|i| NoResultCompany {
                company: format!("Quiet{i}"),
                elapsed: "1.0s".to_string(),
            })
            .collect();
        let lines = report.lines();
        assert!(lines.contains(&"ℹ️  COMPANIES WITH NO JOBS - NORMAL (23):".to_string()));
        assert!(lines.contains(&"  • Quiet19 (1.0s)".to_string()));
        assert!(!lines.contains(&"  • Quiet20 (1.0s)".to_string()));
        assert!(lines.contains(&"  ... and 3 more companies".to_string()));
    }

    #[test]
    fn issue_and_timing_sections() {
        let mut report = sample();
        report.stats = RequestStats {
            total: 5,
            successful: 3,
            rate_limited: 2,
            ..Default::default()
        };
        report.current_delay = Duration::from_millis(200);
        report.delay_recommendation = Some(Duration::from_secs(1));
        report.recent_issues = vec![IssueEntry {
            timestamp: "2026-10-17 09:00:01".to_string(),
            company: "Globex".to_string(),
            kind: IssueKind::RateLimited,
            status: Some(429),
            message: "throttled".to_string(),
        }];
        report.timing = Some(TimingSummary {
            companies: 5,
            total_secs: 50.0,
            avg_secs: 10.0,
            min_secs: 1.0,
            max_secs: 25.0,
            avg_jobs: 4.4,
        });
        report.trend = TimingTrend::between(8.0, 10.0);
        report.slow = vec![SlowCompany {
            company: "Big".to_string(),
            elapsed_secs: 25.0,
            job_count: 50,
        }];

        let lines = report.lines();
        assert!(lines.contains(&"📊 Request Stats (Current delay: 0.2s):".to_string()));
        assert!(lines.contains(&"⚡ RECOMMENDATION: Increase delay from 0.2s to 1.0s".to_string()));
        let issue = "  • 2026-10-17 09:00:01 - Globex: rate_limited (Status: 429)";
        assert!(lines.contains(&issue.to_string()));
        assert!(lines.contains(&"  • Average jobs per company: 4".to_string()));
        assert!(lines.contains(&"  📈 SLOWER (+25.0%)".to_string()));
        assert!(lines.contains(&"🐌 Slow Companies (>20s):".to_string()));
        assert!(lines.contains(&"  • Big: 25.0s for 50 jobs (2.0 jobs/sec)".to_string()));
    }

    #[test]
    fn slow_heading_follows_configured_threshold() {
        let tracker = RunTracker::new(TrackerConfig {
            slow_listing: Duration::from_secs(45),
            ..TrackerConfig::default()
        });
        for (company, secs) in [("Quick", 30), ("Crawly", 50)] {
            let elapsed = Duration::from_secs(secs);
            tracker.record(&ExecutionResult::for_test(company, Ok(Vec::new()), elapsed));
        }

        let lines = sample().with_tracker(&tracker, Duration::from_secs(1)).lines();
        assert!(lines.contains(&"🐌 Slow Companies (>45s):".to_string()));
        assert!(lines.contains(&"  • Crawly: 50.0s for 0 jobs".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("  • Quick: 30.0s")));
    }

    #[test]
    fn delay_formatting() {
        assert_eq!(format_secs(Duration::from_millis(200)), "0.2");
        assert_eq!(format_secs(Duration::from_secs(3)), "3.0");
        assert_eq!(format_secs(Duration::from_millis(1500)), "1.5");
    }

    #[tokio::test]
    async fn saved_artifact_matches_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lines = sample().lines();
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).expect("date");

        let path = save(&lines, dir.path(), date).await.expect("save");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("job_changes_2026-10-17.txt"));
        let text = std::fs::read_to_string(&path).expect("read report");
        assert_eq!(text, lines.join("\n"));
    }
}
