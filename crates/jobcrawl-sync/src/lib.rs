//! Crawl orchestration: directory ingestion, task building, bounded dispatch,
//! outcome tracking, corpus merge and the change report.

pub mod config;
pub mod diff;
pub mod directory;
pub mod dispatch;
pub mod export;
pub mod history;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod task;
pub mod tracker;

pub use config::{
    default_max_workers, CrawlConfig, HighlightRules, HIGHLIGHT_RULES_VERSION, MAX_WORKERS_CAP,
};
pub use diff::SnapshotDiff;
pub use directory::{load_companies, parse_companies, DirectoryLoad};
pub use dispatch::{DispatchConfig, DispatchOutcome, Dispatcher, ExecutionResult, TaskFailure};
pub use export::{export_parquet, ParquetManifest, ParquetManifestFile};
pub use history::{RunTiming, TimingHistory, TimingTrend, Trend};
pub use pipeline::{CrawlPipeline, RunSummary};
pub use report::RunReport;
pub use stats::CorpusStats;
pub use task::{build_task, build_tasks, RejectReason, Rejection, Task, TaskBatch};
pub use tracker::{
    IssueEntry, IssueKind, RequestStats, RunTracker, TimingEntry, TimingSummary, TrackerConfig,
};

pub const CRATE_NAME: &str = "jobcrawl-sync";
