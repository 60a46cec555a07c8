use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use jobcrawl_core::{JobRecord, CORPUS_COLUMNS};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};
use uuid::Uuid;

pub const CORPUS_FILE: &str = "all_jobs.csv";
pub const BACKUP_FILE: &str = "all_jobs_backup.csv";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed corpus file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("encoding corpus rows: {0}")]
    Encode(String),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Corpus size after the merge.
    pub merged_count: usize,
    /// Records that did not match an existing link (including linkless ones).
    pub added_count: usize,
    /// Records that replaced an existing entry with the same link.
    pub replaced_count: usize,
}

/// In-memory corpus with a link index and a per-company link index.
///
/// The per-company index lets a task ask "is this link new for my company"
/// in time proportional to that company's records, not the whole corpus.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    records: Vec<JobRecord>,
    by_link: HashMap<String, usize>,
    by_company: HashMap<String, HashSet<String>>,
}

impl Corpus {
    pub fn from_records(records: Vec<JobRecord>) -> Self {
        let mut corpus = Self::default();
        corpus.merge(records);
        corpus
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn get(&self, link: &str) -> Option<&JobRecord> {
        self.by_link.get(link.trim()).map(|&idx| &self.records[idx])
    }

    pub fn company_count(&self) -> usize {
        self.by_company.len()
    }

    pub fn known_links(&self, company: &str) -> Option<&HashSet<String>> {
        self.by_company.get(company)
    }

    /// Returns the subset of `jobs` not yet known for `company` and records their links.
    ///
    /// Linkless jobs are always reported as new.
    pub fn observe<'a>(&mut self, company: &str, jobs: &'a [JobRecord]) -> Vec<&'a JobRecord> {
        let known = self.by_company.entry(company.to_string()).or_default();
        jobs.iter()
            .filter(|job| match job.canonical_link() {
                Some(link) => known.insert(link.to_string()),
                None => true,
            })
            .collect()
    }

    /// Folds `incoming` into the corpus. Same link replaces (last write wins),
    /// anything else is appended.
    pub fn merge(&mut self, incoming: Vec<JobRecord>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for record in incoming {
            let Some(link) = record.canonical_link().map(str::to_string) else {
                self.records.push(record);
                outcome.added_count += 1;
                continue;
            };

            match self.by_link.get(&link) {
                Some(&idx) => {
                    let previous_company = &self.records[idx].company_name;
                    if *previous_company != record.company_name {
                        if let Some(links) = self.by_company.get_mut(previous_company) {
                            links.remove(&link);
                        }
                    }
                    self.by_company
                        .entry(record.company_name.clone())
                        .or_default()
                        .insert(link);
                    self.records[idx] = record;
                    outcome.replaced_count += 1;
                }
                None => {
                    self.by_company
                        .entry(record.company_name.clone())
                        .or_default()
                        .insert(link.clone());
                    self.by_link.insert(link, self.records.len());
                    self.records.push(record);
                    outcome.added_count += 1;
                }
            }
        }
        outcome.merged_count = self.records.len();
        outcome
    }
}

/// The persisted corpus file plus its pre-run backup sibling.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    root: PathBuf,
}

impl CorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.root.join(CORPUS_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.root.join(BACKUP_FILE)
    }

    /// Loads the corpus and builds its indexes. A missing or empty file is an empty corpus.
    pub async fn load(&self) -> Result<Corpus, StoreError> {
        let records = read_records(&self.corpus_path()).await?;
        Ok(Corpus::from_records(records))
    }

    /// Raw rows of the pre-run snapshot, in file order.
    pub async fn load_backup(&self) -> Result<Vec<JobRecord>, StoreError> {
        read_records(&self.backup_path()).await
    }

    /// Raw rows of the current corpus, in file order.
    pub async fn load_current(&self) -> Result<Vec<JobRecord>, StoreError> {
        read_records(&self.corpus_path()).await
    }

    /// Copies the current corpus to the backup path and returns the row count.
    ///
    /// When no corpus exists yet an empty backup is written, so the next diff
    /// compares against an empty "before" view instead of a stale one.
    pub async fn backup(&self) -> Result<usize, StoreError> {
        let records = read_records(&self.corpus_path()).await?;
        let bytes = encode_records(&records)?;
        write_atomic(&self.backup_path(), &bytes).await?;
        debug!(rows = records.len(), path = %self.backup_path().display(), "corpus backup written");
        Ok(records.len())
    }

    /// Re-reads the on-disk corpus, merges `incoming` into it, and swaps the
    /// result in atomically. On failure the previous file is left untouched.
    pub async fn merge_and_persist(
        &self,
        incoming: Vec<JobRecord>,
    ) -> Result<MergeOutcome, StoreError> {
        let path = self.corpus_path();
        let mut corpus = self.load().await?;
        let outcome = corpus.merge(incoming);
        let bytes = encode_records(corpus.records())?;
        if let Err(err) = write_atomic(&path, &bytes).await {
            error!(path = %path.display(), error = %err, "corpus merge could not be persisted");
            return Err(err);
        }
        debug!(
            added = outcome.added_count,
            replaced = outcome.replaced_count,
            total = outcome.merged_count,
            "corpus merged"
        );
        Ok(outcome)
    }
}

async fn read_records(path: &Path) -> Result<Vec<JobRecord>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes.as_slice());
    reader
        .deserialize::<JobRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

fn encode_records(records: &[JobRecord]) -> Result<Vec<u8>, StoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(CORPUS_COLUMNS)
        .map_err(|e| StoreError::Encode(e.to_string()))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Encode(e.to_string()))
}

/// Writes through a temp file in the same directory, then renames over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::io(parent, e))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let result = async {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(err) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StoreError::io(path, err));
    }
    Ok(())
}
