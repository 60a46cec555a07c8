//! Corpus persistence, HTTP fetch utilities, and per-host pacing for jobcrawl.

mod corpus;
mod fetch;
mod limiter;

pub use corpus::{Corpus, CorpusStore, MergeOutcome, StoreError, BACKUP_FILE, CORPUS_FILE};
pub use fetch::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, HttpClientConfig,
    HttpFetcher, RetryDisposition,
};
pub use limiter::{rate_limit_key, DomainRateLimiter, GLOBAL_HOST_KEY};

pub const CRATE_NAME: &str = "jobcrawl-storage";
