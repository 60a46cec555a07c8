//! Per-run timing averages kept across runs for the performance trend.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::tracker::TimingEntry;

pub const HISTORY_FILE: &str = "timing_history.json";
pub const MAX_RUNS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyTiming {
    pub company: String,
    pub elapsed_time: f64,
    pub job_count: usize,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTiming {
    pub date: String,
    pub total_companies: usize,
    pub avg_time: f64,
    #[serde(default)]
    pub companies: Vec<CompanyTiming>,
}

impl RunTiming {
    /// `None` for a run that executed no tasks.
    pub fn from_timings(date: impl Into<String>, timings: &[TimingEntry]) -> Option<Self> {
        if timings.is_empty() {
            return None;
        }
        let companies: Vec<CompanyTiming> = timings
            .iter()
            .map(|t| CompanyTiming {
                company: t.company.clone(),
                elapsed_time: t.elapsed.as_secs_f64(),
                job_count: t.job_count,
                status: t.kind.to_string(),
                error: t.error.clone(),
            })
            .collect();
        let avg_time =
            companies.iter().map(|c| c.elapsed_time).sum::<f64>() / companies.len() as f64;
        Some(Self {
            date: date.into(),
            total_companies: companies.len(),
            avg_time,
            companies,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Slower,
    Faster,
    Stable,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Slower => "slower",
            Trend::Faster => "faster",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingTrend {
    pub previous_avg: f64,
    pub current_avg: f64,
    pub trend: Trend,
    pub change_percent: f64,
}

impl TimingTrend {
    /// Slower above +20%, faster below -20%. `None` when there is no usable baseline.
    pub fn between(previous_avg: f64, current_avg: f64) -> Option<Self> {
        if previous_avg.is_nan() || previous_avg <= 0.0 {
            return None;
        }
        let trend = if current_avg > previous_avg * 1.2 {
            Trend::Slower
        } else if current_avg < previous_avg * 0.8 {
            Trend::Faster
        } else {
            Trend::Stable
        };
        Some(Self {
            previous_avg,
            current_avg,
            trend,
            change_percent: (current_avg - previous_avg) / previous_avg * 100.0,
        })
    }
}

/// The rolling `timing_history.json` file.
#[derive(Debug, Clone)]
pub struct TimingHistory {
    path: PathBuf,
    runs: Vec<RunTiming>,
}

impl TimingHistory {
    /// Reads the history under `dir`. A missing or unreadable file starts a fresh history.
    pub async fn load(dir: &Path) -> Self {
        let path = dir.join(HISTORY_FILE);
        let runs = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "timing history unreadable; starting fresh"
                );
                Vec::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "timing history unreadable; starting fresh"
                );
                Vec::new()
            }
        };
        Self { path, runs }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn runs(&self) -> &[RunTiming] {
        &self.runs
    }

    pub fn append(&mut self, run: RunTiming) {
        self.runs.push(run);
        if self.runs.len() > MAX_RUNS {
            let excess = self.runs.len() - MAX_RUNS;
            self.runs.drain(..excess);
        }
    }

    /// Compares the last two runs.
    pub fn trend(&self) -> Option<TimingTrend> {
        match self.runs.as_slice() {
            [.., previous, current] => TimingTrend::between(previous.avg_time, current.avg_time),
            _ => None,
        }
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(&self.runs).context("serializing timing history")?;
        fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        debug!(runs = self.runs.len(), path = %self.path.display(), "timing history saved");
        Ok(())
    }
}
