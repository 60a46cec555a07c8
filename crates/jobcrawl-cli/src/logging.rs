use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE: &str = "job_crawler.log";

/// Logs to stderr and appends the same stream to `<output_dir>/job_crawler.log`.
///
/// `RUST_LOG` overrides the default `info,jobcrawl=debug` filter. When the log
/// file cannot be opened the crawl still runs with stderr logging only.
pub fn init_logging(output_dir: &Path) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jobcrawl=debug"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, file_error) = match open_log_file(output_dir) {
        Ok(file) => (
            Some(fmt::layer().with_writer(Arc::new(file)).with_ansi(false).with_target(false)),
            None,
        ),
        Err(err) => (None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;

    match file_error {
        None => {
            tracing::debug!(path = %output_dir.join(LOG_FILE).display(), "file logging enabled")
        }
        Some(err) => {
            let reason = format!("{err:#}");
            tracing::warn!(error = %reason, "file logging disabled");
        }
    }
    Ok(())
}

fn open_log_file(output_dir: &Path) -> Result<fs::File> {
    fs::create_dir_all(output_dir).with_context(|| format!("creating {}", output_dir.display()))?;
    let path = output_dir.join(LOG_FILE);
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_under_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("out");
        open_log_file(&nested).expect("open log file");
        assert!(nested.join(LOG_FILE).exists());
    }
}
