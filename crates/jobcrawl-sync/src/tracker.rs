//! Per-run outcome and timing bookkeeping shared by all workers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;

use crate::dispatch::ExecutionResult;
use crate::task::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Success,
    RateLimited,
    Timeout,
    ConnectionError,
    GenericError,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Success => "success",
            IssueKind::RateLimited => "rate_limited",
            IssueKind::Timeout => "timeout",
            IssueKind::ConnectionError => "connection_error",
            IssueKind::GenericError => "generic_error",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Completed tasks needed before the delay advice can fire.
    pub min_sample: usize,
    pub issue_ratio_threshold: f64,
    /// Tasks slower than this land on the problem list.
    pub long_task: Duration,
    pub slow_warning: Duration,
    pub slow_listing: Duration,
    pub recent_window: usize,
    pub rate_limited_delay_cap: Duration,
    pub timeout_delay_cap: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_sample: 5,
            issue_ratio_threshold: 0.2,
            long_task: Duration::from_secs(60),
            slow_warning: Duration::from_secs(30),
            slow_listing: Duration::from_secs(20),
            recent_window: 10,
            rate_limited_delay_cap: Duration::from_secs(5),
            timeout_delay_cap: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub total: usize,
    pub successful: usize,
    pub rate_limited: usize,
    pub timeouts: usize,
    pub connection_errors: usize,
    pub generic_errors: usize,
}

impl RequestStats {
    fn count(&mut self, kind: IssueKind) {
        self.total += 1;
        match kind {
            IssueKind::Success => self.successful += 1,
            IssueKind::RateLimited => self.rate_limited += 1,
            IssueKind::Timeout => self.timeouts += 1,
            IssueKind::ConnectionError => self.connection_errors += 1,
            IssueKind::GenericError => self.generic_errors += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.successful
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueEntry {
    pub timestamp: String,
    pub company: String,
    pub kind: IssueKind,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEntry {
    pub company: String,
    /// Adapter call duration, excluding the pacing wait.
    pub elapsed: Duration,
    pub job_count: usize,
    pub kind: IssueKind,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingSummary {
    pub companies: usize,
    pub total_secs: f64,
    pub avg_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
    pub avg_jobs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlowCompany {
    pub company: String,
    pub elapsed_secs: f64,
    pub job_count: usize,
}

impl SlowCompany {
    pub fn jobs_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.job_count as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoResultCompany {
    pub company: String,
    pub elapsed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemCompany {
    pub company: String,
    pub reason: String,
}

#[derive(Debug, Default)]
struct TrackerState {
    stats: RequestStats,
    issues: VecDeque<IssueEntry>,
    timings: Vec<TimingEntry>,
    rejections: Vec<Rejection>,
}

/// Outcome counters, recent issue log and per-task timings for one run.
///
/// Workers call [`RunTracker::record`] concurrently; the lock is held only
/// for the in-memory update.
#[derive(Debug, Default)]
pub struct RunTracker {
    config: TrackerConfig,
    state: Mutex<TrackerState>,
}

impl RunTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, result: &ExecutionResult) {
        let kind = result.kind();
        let (status, message) = match &result.outcome {
            Ok(_) => (None, None),
            Err(failure) => (failure.status, Some(failure.message.clone())),
        };
        let timing = TimingEntry {
            company: result.company.clone(),
            elapsed: result.elapsed,
            job_count: result.job_count(),
            kind,
            error: message.clone(),
        };

        let mut state = self.state();
        state.stats.count(kind);
        state.timings.push(timing);
        if let Some(message) = message {
            state.issues.push_back(IssueEntry {
                timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                company: result.company.clone(),
                kind,
                status,
                message,
            });
            while state.issues.len() > self.config.recent_window {
                state.issues.pop_front();
            }
        }
    }

    pub fn record_rejection(&self, rejection: &Rejection) {
        self.state().rejections.push(rejection.clone());
    }

    pub fn stats(&self) -> RequestStats {
        self.state().stats
    }

    pub fn recent_issues(&self) -> Vec<IssueEntry> {
        self.state().issues.iter().cloned().collect()
    }

    pub fn rejections(&self) -> Vec<Rejection> {
        self.state().rejections.clone()
    }

    pub fn timings(&self) -> Vec<TimingEntry> {
        self.state().timings.clone()
    }

    /// Fires once enough tasks completed and throttling plus timeouts exceed the threshold share.
    pub fn should_increase_delay(&self) -> bool {
        let stats = self.stats();
        if stats.total < self.config.min_sample {
            return false;
        }
        let pressure = (stats.rate_limited + stats.timeouts) as f64 / stats.total as f64;
        pressure > self.config.issue_ratio_threshold
    }

    /// Advisory delay for the next run, or `None` when the current pacing looks fine.
    ///
    /// Throttling-dominated runs double the delay (capped at 5s), otherwise
    /// it grows by half (capped at 3s). Advice never drops below `current`.
    pub fn delay_recommendation(&self, current: Duration) -> Option<Duration> {
        if !self.should_increase_delay() {
            return None;
        }
        let stats = self.stats();
        let base = if current.is_zero() { Duration::from_secs(1) } else { current };
        let proposed = if stats.rate_limited > stats.timeouts {
            base.mul_f64(2.0).min(self.config.rate_limited_delay_cap)
        } else {
            base.mul_f64(1.5).min(self.config.timeout_delay_cap)
        };
        Some(proposed.max(current))
    }

    pub fn timing_summary(&self) -> Option<TimingSummary> {
        let state = self.state();
        if state.timings.is_empty() {
            return None;
        }
        let secs: Vec<f64> = state.timings.iter().map(|t| t.elapsed.as_secs_f64()).collect();
        let total: f64 = secs.iter().sum();
        let count = secs.len() as f64;
        let jobs: usize = state.timings.iter().map(|t| t.job_count).sum();
        Some(TimingSummary {
            companies: secs.len(),
            total_secs: total,
            avg_secs: total / count,
            min_secs: secs.iter().copied().fold(f64::INFINITY, f64::min),
            max_secs: secs.iter().copied().fold(0.0, f64::max),
            avg_jobs: jobs as f64 / count,
        })
    }

    /// Tasks slower than `threshold`, slowest first.
    pub fn slow_companies(&self, threshold: Duration) -> Vec<SlowCompany> {
        let mut slow: Vec<SlowCompany> = self
            .state()
            .timings
            .iter()
            .filter(|t| t.elapsed > threshold)
            .map(|t| SlowCompany {
                company: t.company.clone(),
                elapsed_secs: t.elapsed.as_secs_f64(),
                job_count: t.job_count,
            })
            .collect();
        slow.sort_by(|a, b| b.elapsed_secs.total_cmp(&a.elapsed_secs));
        slow
    }

    /// Successful tasks that returned nothing within normal time. Not a failure.
    pub fn no_result_companies(&self) -> Vec<NoResultCompany> {
        self.state()
            .timings
            .iter()
            .filter(|t| {
                t.kind == IssueKind::Success
                    && t.job_count == 0
                    && t.elapsed <= self.config.long_task
            })
            .map(|t| NoResultCompany {
                company: t.company.clone(),
                elapsed: format!("{:.1}s", t.elapsed.as_secs_f64()),
            })
            .collect()
    }

    /// Rejected rows, failed tasks, and tasks that ran past the long-task threshold.
    pub fn problem_companies(&self) -> Vec<ProblemCompany> {
        let state = self.state();
        let long = self.config.long_task;
        let mut problems: Vec<ProblemCompany> = state
            .rejections
            .iter()
            .map(|r| ProblemCompany {
                company: r.company.clone(),
                reason: r.reason.to_string(),
            })
            .collect();

        for timing in &state.timings {
            let secs = timing.elapsed.as_secs_f64();
            let slow = timing.elapsed > long;
            let reason = match (&timing.error, slow) {
                (Some(err), true) => {
                    format!("Error + slow performance: {secs:.1}s - {}", truncate(err, 50))
                }
                (Some(err), false) => format!("Error: {}", truncate(err, 80)),
                (None, true) if timing.job_count == 0 => {
                    format!("Possible scraping issue: {secs:.1}s with no jobs")
                }
                (None, true) => {
                    format!("Slow performance: {secs:.1}s for {} jobs", timing.job_count)
                }
                (None, false) => continue,
            };
            problems.push(ProblemCompany {
                company: timing.company.clone(),
                reason,
            });
        }
        problems
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TaskFailure;
    use crate::task::RejectReason;
    use jobcrawl_core::JobRecord;

    fn success(company: &str, secs: u64, jobs: usize) -> ExecutionResult {
        let records = (0..jobs)
            .map(|i| JobRecord::new(company, format!("Job {i}"), format!("https://{company}/{i}")))
            .collect();
        ExecutionResult::for_test(company, Ok(records), Duration::from_secs(secs))
    }

    fn failure(company: &str, secs: u64, kind: IssueKind, status: Option<u16>) -> ExecutionResult {
        let failure = TaskFailure {
            kind,
            message: format!("{kind} while scraping {company}"),
            status,
        };
        ExecutionResult::for_test(company, Err(failure), Duration::from_secs(secs))
    }

    #[test]
    fn delay_advice_needs_a_sample_and_pressure() {
        let tracker = RunTracker::default();
        for company in ["a", "b", "c"] {
            tracker.record(&failure(company, 1, IssueKind::RateLimited, Some(429)));
        }
        assert!(!tracker.should_increase_delay(), "below the minimum sample");

        tracker.record(&success("d", 1, 2));
        tracker.record(&success("e", 1, 2));
        assert!(tracker.should_increase_delay());
        assert_eq!(
            tracker.delay_recommendation(Duration::from_secs(2)),
            Some(Duration::from_secs(4))
        );
        assert_eq!(
            tracker.delay_recommendation(Duration::from_secs(4)),
            Some(Duration::from_secs(5)),
            "throttling advice is capped"
        );
    }

    #[test]
    fn timeout_dominated_runs_grow_by_half() {
        let tracker = RunTracker::default();
        tracker.record(&failure("a", 1, IssueKind::Timeout, None));
        tracker.record(&failure("b", 1, IssueKind::Timeout, None));
        for company in ["c", "d", "e"] {
            tracker.record(&success(company, 1, 1));
        }
        assert_eq!(
            tracker.delay_recommendation(Duration::from_secs(1)),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn healthy_runs_get_no_advice() {
        let tracker = RunTracker::default();
        tracker.record(&failure("a", 1, IssueKind::ConnectionError, None));
        for company in ["b", "c", "d", "e"] {
            tracker.record(&success(company, 1, 1));
        }
        assert!(!tracker.should_increase_delay());
        assert_eq!(tracker.delay_recommendation(Duration::from_secs(1)), None);
    }

    #[test]
    fn issue_log_keeps_recent_window() {
        let tracker = RunTracker::new(TrackerConfig {
            recent_window: 2,
            ..TrackerConfig::default()
        });
        tracker.record(&failure("a", 1, IssueKind::Timeout, None));
        tracker.record(&success("b", 1, 1));
        tracker.record(&failure("c", 1, IssueKind::RateLimited, Some(503)));
        tracker.record(&failure("d", 1, IssueKind::GenericError, None));

        let recent = tracker.recent_issues();
        assert_eq!(recent.iter().map(|i| i.company.as_str()).collect::<Vec<_>>(), vec!["c", "d"]);
        assert_eq!(recent[0].status, Some(503));

        let stats = tracker.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed(), 3);
        assert_eq!(stats.generic_errors, 1);
    }

    #[test]
    fn zero_results_are_not_problems_unless_slow() {
        let tracker = RunTracker::default();
        tracker.record(&success("quiet", 2, 0));
        tracker.record(&success("stuck", 75, 0));
        tracker.record(&success("big", 90, 400));
        tracker.record(&failure("broken", 3, IssueKind::GenericError, None));
        tracker.record(&failure("hung", 61, IssueKind::Timeout, None));
        tracker.record_rejection(&Rejection {
            company: "nolink".to_string(),
            reason: RejectReason::MissingLocator,
        });

        let no_results = tracker.no_result_companies();
        assert_eq!(
            no_results,
            vec![NoResultCompany { company: "quiet".into(), elapsed: "2.0s".into() }]
        );

        let problems = tracker.problem_companies();
        let reasons: Vec<(&str, &str)> =
            problems.iter().map(|p| (p.company.as_str(), p.reason.as_str())).collect();
        assert_eq!(reasons[0], ("nolink", "No career page"));
        assert_eq!(reasons[1], ("stuck", "Possible scraping issue: 75.0s with no jobs"));
        assert_eq!(reasons[2], ("big", "Slow performance: 90.0s for 400 jobs"));
        assert_eq!(reasons[3], ("broken", "Error: generic_error while scraping broken"));
        assert!(reasons[4].1.starts_with("Error + slow performance: 61.0s - timeout"));
        assert!(!reasons.iter().any(|(company, _)| *company == "quiet"));
    }

    #[test]
    fn timing_summary_and_slow_list() {
        let tracker = RunTracker::default();
        assert!(tracker.timing_summary().is_none());

        tracker.record(&success("a", 10, 10));
        tracker.record(&success("b", 30, 30));
        tracker.record(&success("c", 20, 5));

        let summary = tracker.timing_summary().expect("summary");
        assert_eq!(summary.companies, 3);
        assert!((summary.avg_secs - 20.0).abs() < 1e-9);
        assert!((summary.min_secs - 10.0).abs() < 1e-9);
        assert!((summary.max_secs - 30.0).abs() < 1e-9);
        assert!((summary.avg_jobs - 15.0).abs() < 1e-9);

        let slow = tracker.slow_companies(Duration::from_secs(15));
        assert_eq!(slow.iter().map(|s| s.company.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert!((slow[0].jobs_per_sec() - 1.0).abs() < 1e-9);
    }
}
