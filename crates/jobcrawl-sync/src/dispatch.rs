//! Bounded concurrent execution of scrape tasks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jobcrawl_adapters::AdapterError;
use jobcrawl_core::JobRecord;
use jobcrawl_storage::{DomainRateLimiter, HttpFetcher};
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::config::MAX_WORKERS_CAP;
use crate::task::Task;
use crate::tracker::{IssueKind, RunTracker};

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub max_workers: usize,
    /// Minimum spacing between request starts to the same host.
    pub delay: Duration,
    pub task_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: crate::config::default_max_workers(),
            delay: Duration::from_millis(200),
            task_timeout: Duration::from_secs(300),
        }
    }
}

/// Classified failure of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: IssueKind,
    pub message: String,
    pub status: Option<u16>,
}

impl TaskFailure {
    pub fn classify(err: &AdapterError) -> Self {
        let (kind, status) = match err {
            AdapterError::RateLimited { status, .. } => (IssueKind::RateLimited, Some(*status)),
            AdapterError::Timeout(_) => (IssueKind::Timeout, None),
            AdapterError::Connection(_) => (IssueKind::ConnectionError, None),
            AdapterError::HttpStatus { status, .. } => (IssueKind::GenericError, Some(*status)),
            AdapterError::Parse(_) | AdapterError::InvalidLocator(_) | AdapterError::Other(_) => {
                (IssueKind::GenericError, None)
            }
        };
        Self {
            kind,
            message: err.to_string(),
            status,
        }
    }

    fn deadline_exceeded(limit: Duration) -> Self {
        Self {
            kind: IssueKind::Timeout,
            message: format!("task exceeded {:.0}s deadline", limit.as_secs_f64()),
            status: None,
        }
    }

    fn panicked(err: JoinError) -> Self {
        let detail = match err.try_into_panic() {
            Ok(payload) => payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string()),
            Err(err) => err.to_string(),
        };
        Self {
            kind: IssueKind::GenericError,
            message: format!("adapter panicked: {detail}"),
            status: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub company: String,
    pub adapter_key: String,
    pub outcome: Result<Vec<JobRecord>, TaskFailure>,
    /// Adapter call duration.
    pub elapsed: Duration,
    /// Time spent waiting on the host's pacing slot.
    pub waited: Duration,
}

impl ExecutionResult {
    pub fn kind(&self) -> IssueKind {
        match &self.outcome {
            Ok(_) => IssueKind::Success,
            Err(failure) => failure.kind,
        }
    }

    pub fn job_count(&self) -> usize {
        self.outcome.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// End-to-end time including the pacing wait.
    pub fn total_elapsed(&self) -> Duration {
        self.waited + self.elapsed
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        company: &str,
        outcome: Result<Vec<JobRecord>, TaskFailure>,
        elapsed: Duration,
    ) -> Self {
        Self {
            company: company.to_string(),
            adapter_key: "test".to_string(),
            outcome,
            elapsed,
            waited: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub completed: usize,
    /// Tasks abandoned or never started because of an interrupt.
    pub cancelled: usize,
    pub interrupted: bool,
}

/// Runs tasks on a bounded pool and hands results over as they finish.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    limiter: Arc<DomainRateLimiter>,
    tracker: Arc<RunTracker>,
    http: HttpFetcher,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        limiter: Arc<DomainRateLimiter>,
        tracker: Arc<RunTracker>,
        http: HttpFetcher,
        config: DispatchConfig,
    ) -> Self {
        Self {
            limiter,
            tracker,
            http,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<RunTracker> {
        &self.tracker
    }

    pub fn worker_count(&self, task_count: usize) -> usize {
        self.config.max_workers.clamp(1, MAX_WORKERS_CAP).min(task_count.max(1))
    }

    /// Waits for the host slot, calls the adapter under the task deadline,
    /// and classifies the result.
    pub async fn execute(&self, task: &Task) -> ExecutionResult {
        let waited = self.limiter.wait(task.host_key(), self.config.delay).await;
        let request = task.scrape_request(self.config.delay);

        let started = Instant::now();
        let call = task.adapter().scrape_jobs(&self.http, &request);
        let outcome = match tokio::time::timeout(self.config.task_timeout, call).await {
            Ok(Ok(jobs)) => Ok(jobs),
            Ok(Err(err)) => Err(TaskFailure::classify(&err)),
            Err(_) => Err(TaskFailure::deadline_exceeded(self.config.task_timeout)),
        };
        let elapsed = started.elapsed();

        let result = ExecutionResult {
            company: task.company_name().to_string(),
            adapter_key: task.adapter_key().to_string(),
            outcome,
            elapsed,
            waited,
        };
        self.tracker.record(&result);
        result
    }

    /// Executes `tasks` and passes each result to `on_result` in completion order.
    ///
    /// When `shutdown` resolves no further task is started and in-flight tasks
    /// are abandoned. Results already handed to `on_result` stay with the caller.
    /// A task that panics is recorded and reported as a generic error.
    pub async fn run<S, F>(
        &self,
        tasks: Vec<Task>,
        shutdown: S,
        mut on_result: F,
    ) -> DispatchOutcome
    where
        S: Future<Output = ()>,
        F: FnMut(ExecutionResult),
    {
        let workers = self.worker_count(tasks.len());
        debug!(tasks = tasks.len(), workers, "dispatching");

        let permits = Arc::new(Semaphore::new(workers));
        let mut join_set = JoinSet::new();
        let mut owners: HashMap<Id, (String, String)> = HashMap::new();
        for task in tasks {
            let dispatcher = self.clone();
            let permits = permits.clone();
            let company = task.company_name().to_string();
            let adapter_key = task.adapter_key().to_string();
            let span = info_span!("scrape", company = %company, adapter = %adapter_key);
            let handle = join_set.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return None;
                    };
                    Some(dispatcher.execute(&task).await)
                }
                .instrument(span),
            );
            owners.insert(handle.id(), (company, adapter_key));
        }

        let mut outcome = DispatchOutcome::default();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown, if !outcome.interrupted => {
                    warn!(
                        pending = join_set.len(),
                        "interrupt received; abandoning remaining tasks"
                    );
                    outcome.interrupted = true;
                    permits.close();
                    join_set.abort_all();
                }
                joined = join_set.join_next_with_id() => match joined {
                    None => break,
                    Some(Ok((id, Some(result)))) => {
                        owners.remove(&id);
                        outcome.completed += 1;
                        on_result(result);
                    }
                    Some(Ok((id, None))) => {
                        owners.remove(&id);
                        outcome.cancelled += 1;
                    }
                    Some(Err(err)) if err.is_cancelled() => {
                        owners.remove(&err.id());
                        outcome.cancelled += 1;
                    }
                    Some(Err(err)) => {
                        let (company, adapter_key) =
                            owners.remove(&err.id()).unwrap_or_default();
                        let failure = TaskFailure::panicked(err);
                        error!(
                            company = %company,
                            error = %failure.message,
                            "scrape task panicked"
                        );
                        let result = ExecutionResult {
                            company,
                            adapter_key,
                            outcome: Err(failure),
                            elapsed: Duration::ZERO,
                            waited: Duration::ZERO,
                        };
                        self.tracker.record(&result);
                        outcome.completed += 1;
                        on_result(result);
                    }
                },
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jobcrawl_adapters::{AdapterRegistry, ScrapeRequest, SourceAdapter};
    use jobcrawl_core::CompanyRow;
    use jobcrawl_storage::HttpClientConfig;

    use crate::task::build_tasks;

    /// Sleeps for the number of seconds in the locator's last segment, then returns one job.
    struct SleepyAdapter;

    #[async_trait]
    impl SourceAdapter for SleepyAdapter {
        fn name(&self) -> &'static str {
            "Sleepy"
        }

        async fn scrape_jobs(
            &self,
            _http: &HttpFetcher,
            req: &ScrapeRequest,
        ) -> Result<Vec<JobRecord>, AdapterError> {
            let secs: u64 =
                req.locator.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let link = format!("{}/job", req.locator);
            Ok(vec![JobRecord::new(&req.company_name, "Engineer", link)])
        }
    }

    struct FailingAdapter(fn() -> AdapterError);

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn scrape_jobs(
            &self,
            _http: &HttpFetcher,
            _req: &ScrapeRequest,
        ) -> Result<Vec<JobRecord>, AdapterError> {
            Err((self.0)())
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl SourceAdapter for PanickingAdapter {
        fn name(&self) -> &'static str {
            "Panicking"
        }

        async fn scrape_jobs(
            &self,
            _http: &HttpFetcher,
            req: &ScrapeRequest,
        ) -> Result<Vec<JobRecord>, AdapterError> {
            let pages: Vec<usize> = Vec::new();
            let page = pages[req.locator.len()];
            let link = format!("{}/{page}", req.locator);
            Ok(vec![JobRecord::new(&req.company_name, "Engineer", link)])
        }
    }

    fn registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::new();
        registry.register("sleepy", Arc::new(SleepyAdapter));
        registry.register("throttled", Arc::new(FailingAdapter(|| AdapterError::RateLimited {
            status: 429,
            url: "https://throttled.example".to_string(),
        })));
        registry.register("panicking", Arc::new(PanickingAdapter));
        registry.register(
            "slowpoke",
            Arc::new(FailingAdapter(|| AdapterError::Timeout("read timed out".to_string()))),
        );
        registry
    }

    fn row(name: &str, locator: &str, label: &str) -> CompanyRow {
        CompanyRow {
            name: name.to_string(),
            career_page: locator.to_string(),
            label: label.to_string(),
            ..Default::default()
        }
    }

    fn dispatcher(config: DispatchConfig) -> Dispatcher {
        let http = HttpFetcher::new(HttpClientConfig::default()).expect("http client");
        Dispatcher::new(
            Arc::new(DomainRateLimiter::new()),
            Arc::new(RunTracker::default()),
            http,
            config,
        )
    }

    #[test]
    fn adapter_errors_classify_once() {
        let cases = [
            (
                AdapterError::RateLimited { status: 503, url: "u".into() },
                IssueKind::RateLimited,
                Some(503),
            ),
            (AdapterError::Timeout("t".into()), IssueKind::Timeout, None),
            (AdapterError::Connection("c".into()), IssueKind::ConnectionError, None),
            (
                AdapterError::HttpStatus { status: 404, url: "u".into() },
                IssueKind::GenericError,
                Some(404),
            ),
            (AdapterError::Parse("p".into()), IssueKind::GenericError, None),
        ];
        for (err, kind, status) in cases {
            let failure = TaskFailure::classify(&err);
            assert_eq!(failure.kind, kind);
            assert_eq!(failure.status, status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn results_arrive_in_completion_order() {
        let batch = build_tasks(
            vec![
                row("Slow", "https://slow.example/3", "sleepy"),
                row("Fast", "https://fast.example/1", "sleepy"),
                row("Instant", "https://instant.example/0", "sleepy"),
            ],
            &registry(),
        );
        let dispatcher = dispatcher(DispatchConfig {
            max_workers: 4,
            delay: Duration::ZERO,
            task_timeout: Duration::from_secs(60),
        });

        let mut order = Vec::new();
        let outcome = dispatcher
            .run(batch.tasks, std::future::pending(), |result| order.push(result.company))
            .await;

        assert_eq!(order, vec!["Instant", "Fast", "Slow"]);
        assert_eq!(outcome, DispatchOutcome { completed: 3, cancelled: 0, interrupted: false });
        assert_eq!(dispatcher.tracker().stats().successful, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_classified_and_do_not_sink_other_tasks() {
        let batch = build_tasks(
            vec![
                row("Hung", "https://hung.example/120", "sleepy"),
                row("Slowpoke", "https://slowpoke.example/x", "slowpoke"),
                row("Throttled", "https://throttled.example/x", "throttled"),
                row("Fine", "https://fine.example/1", "sleepy"),
            ],
            &registry(),
        );
        let dispatcher = dispatcher(DispatchConfig {
            max_workers: 4,
            delay: Duration::ZERO,
            task_timeout: Duration::from_secs(30),
        });

        let mut results = Vec::new();
        dispatcher.run(batch.tasks, std::future::pending(), |r| results.push(r)).await;

        let kind_of =
            |company: &str| results.iter().find(|r| r.company == company).map(|r| r.kind());
        assert_eq!(kind_of("Hung"), Some(IssueKind::Timeout));
        assert_eq!(kind_of("Slowpoke"), Some(IssueKind::Timeout));
        assert_eq!(kind_of("Throttled"), Some(IssueKind::RateLimited));
        assert_eq!(kind_of("Fine"), Some(IssueKind::Success));

        let stats = dispatcher.tracker().stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.rate_limited, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn same_host_tasks_are_paced_but_elapsed_excludes_the_wait() {
        let batch = build_tasks(
            vec![
                row("A", "https://shared.example/0", "sleepy"),
                row("B", "https://shared.example/0", "sleepy"),
                row("C", "https://shared.example/0", "sleepy"),
            ],
            &registry(),
        );
        let dispatcher = dispatcher(DispatchConfig {
            max_workers: 3,
            delay: Duration::from_secs(2),
            task_timeout: Duration::from_secs(60),
        });

        let started = Instant::now();
        let mut results = Vec::new();
        dispatcher.run(batch.tasks, std::future::pending(), |r| results.push(r)).await;

        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(results.iter().all(|r| r.elapsed.is_zero()));
        let mut waits: Vec<_> = results.iter().map(|r| r.waited).collect();
        waits.sort();
        assert_eq!(waits[0], Duration::ZERO);
        assert!(waits[2] >= Duration::from_secs(4));
        assert_eq!(results[2].total_elapsed(), results[2].waited);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_new_work_and_keeps_finished_results() {
        let batch = build_tasks(
            vec![
                row("First", "https://a.example/1", "sleepy"),
                row("Second", "https://b.example/1", "sleepy"),
                row("Third", "https://c.example/1", "sleepy"),
            ],
            &registry(),
        );
        let dispatcher = dispatcher(DispatchConfig {
            max_workers: 1,
            delay: Duration::ZERO,
            task_timeout: Duration::from_secs(60),
        });

        let mut seen = Vec::new();
        let outcome = dispatcher
            .run(batch.tasks, tokio::time::sleep(Duration::from_millis(1500)), |r| {
                seen.push(r.company)
            })
            .await;

        assert_eq!(seen.len(), 1, "only the task that finished before the interrupt: {seen:?}");
        assert!(outcome.interrupted);
        assert_eq!(outcome.completed, 1);
        assert_eq!(outcome.cancelled, 2);
    }

    #[tokio::test]
    async fn panicking_adapter_is_recorded_as_generic_error() {
        let batch = build_tasks(
            vec![
                row("Kaboom", "https://kaboom.example/jobs", "panicking"),
                row("Fine", "https://fine.example/0", "sleepy"),
            ],
            &registry(),
        );
        let dispatcher = dispatcher(DispatchConfig {
            max_workers: 2,
            delay: Duration::ZERO,
            task_timeout: Duration::from_secs(60),
        });

        let mut results = Vec::new();
        let outcome =
            dispatcher.run(batch.tasks, std::future::pending(), |r| results.push(r)).await;

        assert_eq!(outcome, DispatchOutcome { completed: 2, cancelled: 0, interrupted: false });
        let kaboom =
            results.iter().find(|r| r.company == "Kaboom").expect("panicked company reported");
        assert_eq!(kaboom.adapter_key, "panicking");
        assert_eq!(kaboom.kind(), IssueKind::GenericError);
        let failure = kaboom.outcome.as_ref().expect_err("failure");
        assert!(
            failure.message.starts_with("adapter panicked: index out of bounds"),
            "{}",
            failure.message
        );

        let stats = dispatcher.tracker().stats();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.generic_errors, 1);
        assert!(dispatcher
            .tracker()
            .problem_companies()
            .iter()
            .any(|p| p.company == "Kaboom" && p.reason.starts_with("Error: adapter panicked")));
    }
}
