//! Columnar snapshot of the corpus for downstream analysis.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use jobcrawl_core::{JobRecord, CORPUS_COLUMNS};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

pub const EXPORT_DIR: &str = "snapshots";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub generated_at: String,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub rows: usize,
    pub sha256: String,
    pub bytes: u64,
}

/// Writes `jobs.parquet`, `companies.parquet` and their manifest under `<output_dir>/snapshots`.
/// Returns the manifest path.
pub fn export_parquet(records: &[JobRecord], output_dir: &Path) -> Result<PathBuf> {
    let snapshot_dir = output_dir.join(EXPORT_DIR);
    std::fs::create_dir_all(&snapshot_dir)
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let jobs_path = snapshot_dir.join("jobs.parquet");
    let companies_path = snapshot_dir.join("companies.parquet");
    write_jobs_parquet(&jobs_path, records)?;
    let company_rows = write_companies_parquet(&companies_path, records)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        generated_at: chrono::Utc::now().to_rfc3339(),
        files: vec![
            manifest_entry("jobs", &snapshot_dir, &jobs_path, records.len())?,
            manifest_entry("companies", &snapshot_dir, &companies_path, company_rows)?,
        ],
    };
    let manifest_path = snapshot_dir.join(MANIFEST_FILE);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    std::fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    info!(
        jobs = records.len(),
        companies = company_rows,
        path = %manifest_path.display(),
        "parquet snapshot exported"
    );
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_jobs_parquet(path: &Path, records: &[JobRecord]) -> Result<()> {
    let schema = Arc::new(Schema::new(
        CORPUS_COLUMNS
            .iter()
            .map(|name| Field::new(column_name(name), DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));

    let column = |get: fn(&JobRecord) -> &str| {
        let values: Vec<Option<&str>> = records
            .iter()
            .map(|r| Some(get(r)).filter(|v| !v.is_empty()))
            .collect();
        Arc::new(StringArray::from(values)) as Arc<dyn arrow_array::Array>
    };
    let remote: Vec<Option<&str>> = records
        .iter()
        .map(|r| Some(r.remote.as_str()).filter(|v| !v.is_empty()))
        .collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            column(|r| r.company_name.as_str()),
            column(|r| r.title.as_str()),
            column(|r| r.location.as_str()),
            column(|r| r.link.as_str()),
            column(|r| r.description.as_str()),
            column(|r| r.employment_type.as_str()),
            column(|r| r.department.as_str()),
            column(|r| r.posted_date.as_str()),
            column(|r| r.company_description.as_str()),
            Arc::new(StringArray::from(remote)),
            column(|r| r.label.as_str()),
            column(|r| r.source.as_str()),
            column(|r| r.scraped_date.as_str()),
        ],
    )
    .context("building jobs record batch")?;
    write_parquet(path, batch)
}

fn write_companies_parquet(path: &Path, records: &[JobRecord]) -> Result<usize> {
    let mut companies: BTreeMap<&str, (u32, &str)> = BTreeMap::new();
    for record in records {
        let entry = companies
            .entry(record.company_name.as_str())
            .or_insert((0, record.label.as_str()));
        entry.0 += 1;
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("company_name", DataType::Utf8, false),
        Field::new("label", DataType::Utf8, true),
        Field::new("job_count", DataType::UInt32, false),
    ]));
    let names = StringArray::from(companies.keys().copied().collect::<Vec<_>>());
    let labels = StringArray::from(
        companies
            .values()
            .map(|(_, label)| Some(*label).filter(|l| !l.is_empty()))
            .collect::<Vec<_>>(),
    );
    let counts = UInt32Array::from(companies.values().map(|(n, _)| *n).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(names), Arc::new(labels), Arc::new(counts)],
    )
    .context("building companies record batch")?;
    write_parquet(path, batch)?;
    Ok(companies.len())
}

/// `Company Name` -> `company_name`.
fn column_name(header: &str) -> String {
    header.to_ascii_lowercase().replace(' ', "_")
}

fn manifest_entry(
    name: &str,
    root: &Path,
    path: &Path,
    rows: usize,
) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path.strip_prefix(root).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        rows,
        sha256,
        bytes: bytes.len() as u64,
    })
}
