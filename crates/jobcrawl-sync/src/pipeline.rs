//! One crawl run, end to end.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use jobcrawl_adapters::AdapterRegistry;
use jobcrawl_core::JobRecord;
use jobcrawl_storage::{
    Corpus, CorpusStore, DomainRateLimiter, HttpClientConfig, HttpFetcher, MergeOutcome,
};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{CrawlConfig, HighlightRules};
use crate::diff::SnapshotDiff;
use crate::directory::load_companies;
use crate::dispatch::{DispatchConfig, Dispatcher, ExecutionResult};
use crate::history::{RunTiming, TimingHistory};
use crate::report::{self, format_secs, RunReport};
use crate::task::build_tasks;
use crate::tracker::{IssueKind, RunTracker, TrackerConfig};

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub companies: usize,
    pub scheduled: usize,
    pub rejected: usize,
    pub successful: usize,
    /// Rejected rows plus failed tasks.
    pub failed: usize,
    pub total_jobs: usize,
    pub new_jobs: usize,
    pub merge: MergeOutcome,
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub interrupted: bool,
    pub delay_recommendation: Option<Duration>,
    pub report_path: Option<PathBuf>,
    pub report_lines: Vec<String>,
}

/// Sequences backup, load, task building, dispatch, merge, history, diff and report.
pub struct CrawlPipeline {
    config: CrawlConfig,
    registry: AdapterRegistry,
    highlight: HighlightRules,
    tracker_config: TrackerConfig,
}

impl CrawlPipeline {
    pub fn new(config: CrawlConfig) -> Result<Self> {
        let highlight = match &config.highlight_rules_path {
            Some(path) => HighlightRules::load(path)?,
            None => HighlightRules::default(),
        };
        Ok(Self {
            config,
            registry: AdapterRegistry::builtin(),
            highlight,
            tracker_config: TrackerConfig::default(),
        })
    }

    pub fn with_registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_tracker_config(mut self, tracker_config: TrackerConfig) -> Self {
        self.tracker_config = tracker_config;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Runs until every task finished or Ctrl-C was pressed.
    pub async fn run(&self, directory: &Path) -> Result<RunSummary> {
        self.run_until(directory, interrupt_signal()).await
    }

    /// Like [`CrawlPipeline::run`] with a caller-supplied interrupt.
    ///
    /// Whatever was aggregated before `shutdown` resolved is still merged
    /// and reported. A merge failure is returned after the report is out.
    pub async fn run_until<S>(&self, directory: &Path, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        let config = &self.config;
        let store = CorpusStore::new(&config.output_dir);

        let backed_up = store.backup().await.context("backing up corpus before the run")?;
        let corpus = store.load().await.context("loading corpus")?;
        info!(
            rows = backed_up,
            known = corpus.len(),
            companies = corpus.company_count(),
            "corpus loaded"
        );

        let mut directory_load = load_companies(directory).await?;
        if let Some(limit) = config.limit {
            directory_load.rows.truncate(limit);
        }
        let companies = directory_load.rows.len();

        let batch = build_tasks(directory_load.rows, &self.registry);
        let tracker = Arc::new(RunTracker::new(self.tracker_config));
        for rejection in &batch.rejected {
            warn!(
                company = %rejection.company,
                reason = rejection.reason.code(),
                "  ⚠️  {} - skipping {}",
                rejection.reason,
                rejection.company
            );
            tracker.record_rejection(rejection);
        }

        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout,
            user_agent: Some(config.user_agent.clone()),
            ..HttpClientConfig::default()
        })?;
        let dispatcher = Dispatcher::new(
            Arc::new(DomainRateLimiter::new()),
            tracker.clone(),
            http,
            DispatchConfig {
                max_workers: config.max_workers,
                delay: config.delay,
                task_timeout: config.task_timeout,
            },
        );

        let scheduled = batch.tasks.len();
        info!(
            companies,
            scheduled,
            rejected = batch.rejected.len(),
            workers = dispatcher.worker_count(scheduled),
            "🚀 Crawling {scheduled} companies with {}s per-host delay",
            format_secs(config.delay)
        );

        let mut aggregate =
            Aggregate::new(corpus, &tracker, config.delay, scheduled, batch.rejected.len());
        let dispatched = dispatcher
            .run(batch.tasks, shutdown, |result| aggregate.absorb(result))
            .instrument(info_span!("crawl", scheduled))
            .await;

        let Aggregate {
            records,
            successful,
            failed,
            total_jobs,
            new_jobs,
            ..
        } = aggregate;

        let persisted = store.merge_and_persist(records).await;
        if let Err(err) = &persisted {
            error!(error = %err, "❌ corpus could not be saved; previous corpus left in place");
        }
        if dispatched.interrupted {
            warn!(cancelled = dispatched.cancelled, "⚠️  Interrupted - partial results saved");
        }

        let mut history = TimingHistory::load(&config.output_dir).await;
        let run_date = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        if let Some(run) = RunTiming::from_timings(run_date, &tracker.timings()) {
            history.append(run);
            match history.save().await {
                Ok(()) => info!("💾 Timing history saved to: {}", history.path().display()),
                Err(err) => warn!(error = %err, "⚠️  Could not save timing history"),
            }
        }

        let before = store.load_backup().await.context("reading corpus backup")?;
        let after = store.load_current().await.context("reading merged corpus")?;
        let diff = SnapshotDiff::compute(&before, &after);

        let now = Local::now();
        let report = RunReport::new(now.format("%Y-%m-%d %H:%M:%S").to_string(), diff.clone())
            .interrupted(dispatched.interrupted)
            .with_highlights(&self.highlight, &before, &after)
            .with_tracker(&tracker, config.delay)
            .with_trend(history.trend());
        let lines = report.lines();

        let rule = "=".repeat(80);
        info!("{rule}");
        info!("🎉 COMPLETED!");
        info!("{rule}");
        info!("✓ Successful: {successful} | ❌ Failed: {failed}");
        info!("📦 Total jobs: {total_jobs} | 🆕 New: {new_jobs}");
        info!("💾 Saved to: {}", store.corpus_path().display());
        info!("{rule}");
        report::emit_console(&lines);

        let report_path = match report::save(&lines, &config.output_dir, now.date_naive()).await {
            Ok(path) => {
                info!("📄 Report saved to: {}", path.display());
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "⚠️  Could not save report");
                None
            }
        };

        let merge = persisted.context("persisting merged corpus")?;
        Ok(RunSummary {
            companies,
            scheduled,
            rejected: companies - scheduled,
            successful,
            failed,
            total_jobs,
            new_jobs,
            merge,
            added: diff.added.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
            interrupted: dispatched.interrupted,
            delay_recommendation: report.delay_recommendation,
            report_path,
            report_lines: lines,
        })
    }
}

async fn interrupt_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c; interrupts disabled");
        std::future::pending::<()>().await;
    }
}

/// Folds results into the run's new records as they arrive.
struct Aggregate<'a> {
    corpus: Corpus,
    tracker: &'a RunTracker,
    delay: Duration,
    scraped_date: String,
    scheduled: usize,
    completed: usize,
    records: Vec<JobRecord>,
    successful: usize,
    failed: usize,
    total_jobs: usize,
    new_jobs: usize,
    advised_delay: Option<Duration>,
}

impl<'a> Aggregate<'a> {
    fn new(
        corpus: Corpus,
        tracker: &'a RunTracker,
        delay: Duration,
        scheduled: usize,
        rejected: usize,
    ) -> Self {
        Self {
            corpus,
            tracker,
            delay,
            scraped_date: Local::now().format("%Y-%m-%d").to_string(),
            scheduled,
            completed: 0,
            records: Vec::new(),
            successful: 0,
            failed: rejected,
            total_jobs: 0,
            new_jobs: 0,
            advised_delay: None,
        }
    }

    fn absorb(&mut self, result: ExecutionResult) {
        self.completed += 1;
        let company = result.company.as_str();
        let secs = result.elapsed.as_secs_f64();
        info!(
            company,
            adapter = %result.adapter_key,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "[{}/{}] 🏢 {company} ({})",
            self.completed,
            self.scheduled,
            result.adapter_key
        );

        match result.outcome {
            Ok(mut jobs) => {
                for job in &mut jobs {
                    job.scraped_date.clone_from(&self.scraped_date);
                }
                let fresh = self.corpus.observe(company, &jobs);
                if jobs.is_empty() {
                    info!(company, "  ℹ️  No jobs found in {secs:.1}s");
                } else {
                    info!(
                        company,
                        "  ✅ Found {} jobs ({} new) in {secs:.1}s",
                        jobs.len(),
                        fresh.len()
                    );
                }
                for job in fresh.iter().take(3) {
                    info!("     • {}", job.title);
                }
                if fresh.len() > 3 {
                    info!("     ... and {} more", fresh.len() - 3);
                }
                self.new_jobs += fresh.len();
                self.total_jobs += jobs.len();
                self.successful += 1;
                self.warn_if_slow(company, result.elapsed, jobs.len());
                self.records.extend(jobs);
            }
            Err(failure) => {
                self.failed += 1;
                let status_note =
                    failure.status.map(|s| format!(" (Status: {s})")).unwrap_or_default();
                let detail: String = failure.message.chars().take(80).collect();
                match failure.kind {
                    IssueKind::RateLimited => warn!(
                        company,
                        status = failure.status,
                        "  🚫 Rate limited{status_note}: {detail}"
                    ),
                    IssueKind::Timeout => warn!(company, "  ⏰ Timeout: {detail}"),
                    IssueKind::ConnectionError => warn!(company, "  🔌 Connection error: {detail}"),
                    IssueKind::GenericError | IssueKind::Success => {
                        error!(company, "  ❌ Error{status_note}: {detail}")
                    }
                }
                self.warn_if_slow(company, result.elapsed, 0);
            }
        }

        info!(
            "  📊 Progress: ✓{} ❌{} | Total: {} jobs ({} new)",
            self.successful, self.failed, self.total_jobs, self.new_jobs
        );

        if let Some(recommended) = self.tracker.delay_recommendation(self.delay) {
            if self.advised_delay != Some(recommended) {
                warn!(
                    "  ⚡ HIGH ERROR RATE! Consider increasing delay from {}s to {}s",
                    format_secs(self.delay),
                    format_secs(recommended)
                );
                self.advised_delay = Some(recommended);
            }
        }
    }

    fn warn_if_slow(&self, company: &str, elapsed: Duration, job_count: usize) {
        let config = self.tracker.config();
        let secs = elapsed.as_secs_f64();
        if elapsed > config.long_task {
            if job_count == 0 {
                warn!(
                    company,
                    "  🐌 SLOW COMPANY: {company} took {secs:.1}s with no jobs - \
                     Possible scraping issue"
                );
            } else {
                warn!(
                    company,
                    "  🐌 SLOW COMPANY: {company} took {secs:.1}s - Adding to problems list"
                );
            }
        } else if elapsed > config.slow_warning {
            warn!(company, "  ⏱️  SLOW WARNING: {company} took {secs:.1}s");
        }
    }
}
