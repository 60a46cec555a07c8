use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobcrawl_adapters::AdapterRegistry;
use jobcrawl_storage::CorpusStore;
use jobcrawl_sync::{export_parquet, CorpusStats, CrawlConfig, CrawlPipeline};

mod logging;

#[derive(Debug, Parser)]
#[command(name = "jobcrawl")]
#[command(about = "Crawl company job boards into a deduplicated corpus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl every active company in the directory and merge the results.
    Crawl(CrawlArgs),
    /// Print corpus statistics.
    Stats {
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Write a parquet snapshot of the corpus.
    Export {
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// List the registered adapter labels.
    Adapters,
}

#[derive(Debug, Default, clap::Args)]
struct CrawlArgs {
    /// Company directory CSV.
    input: Option<PathBuf>,
    /// Only crawl the first N companies.
    #[arg(short, long)]
    limit: Option<usize>,
    /// Minimum seconds between requests to the same host.
    #[arg(short, long)]
    delay: Option<f64>,
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    #[arg(short = 'w', long)]
    workers: Option<usize>,
    /// YAML title/location filter for the highlighted report section.
    #[arg(long)]
    highlight_rules: Option<PathBuf>,
}

impl CrawlArgs {
    fn into_config(self) -> Result<CrawlConfig> {
        let mut config = CrawlConfig::from_env();
        if let Some(input) = self.input {
            config.input_path = input;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(delay) = self.delay {
            config.delay = Duration::try_from_secs_f64(delay)
                .with_context(|| format!("invalid delay {delay}"))?;
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                bail!("--workers must be at least 1");
            }
            config.max_workers = workers;
        }
        if let Some(path) = self.highlight_rules {
            config.highlight_rules_path = Some(path);
        }
        config.limit = self.limit;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Crawl(CrawlArgs::default())) {
        Commands::Crawl(args) => {
            let config = args.into_config()?;
            logging::init_logging(&config.output_dir)?;
            let input = config.input_path.clone();
            let pipeline = CrawlPipeline::new(config)?;
            let summary = pipeline.run(&input).await?;
            println!(
                "crawl complete: companies={} successful={} failed={} jobs={} new={} corpus={} \
                 report={}",
                summary.companies,
                summary.successful,
                summary.failed,
                summary.total_jobs,
                summary.new_jobs,
                summary.merge.merged_count,
                summary
                    .report_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        Commands::Stats { output_dir } => {
            let dir = output_dir.unwrap_or_else(|| CrawlConfig::from_env().output_dir);
            let records = CorpusStore::new(&dir).load_current().await?;
            for line in CorpusStats::compute(&records).lines() {
                println!("{line}");
            }
        }
        Commands::Export { output_dir } => {
            let dir = output_dir.unwrap_or_else(|| CrawlConfig::from_env().output_dir);
            let records = CorpusStore::new(&dir).load_current().await?;
            let manifest = export_parquet(&records, &dir)?;
            println!("export complete: jobs={} manifest={}", records.len(), manifest.display());
        }
        Commands::Adapters => {
            for key in AdapterRegistry::builtin().keys() {
                println!("{key}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_flags_override_config() {
        let cli = Cli::parse_from([
            "jobcrawl", "crawl", "companies.csv", "-l", "5", "-d", "1.5", "-o", "out", "-w", "3",
        ]);
        let Some(Commands::Crawl(args)) = cli.command else {
            panic!("expected crawl command");
        };
        let config = args.into_config().expect("config");
        assert_eq!(config.input_path, PathBuf::from("companies.csv"));
        assert_eq!(config.limit, Some(5));
        assert_eq!(config.delay, Duration::from_millis(1500));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.max_workers, 3);
    }

    #[test]
    fn negative_delay_and_zero_workers_are_rejected() {
        let args = CrawlArgs {
            delay: Some(-1.0),
            ..CrawlArgs::default()
        };
        assert!(args.into_config().is_err());

        let args = CrawlArgs {
            workers: Some(0),
            ..CrawlArgs::default()
        };
        assert!(args.into_config().is_err());
    }

    #[test]
    fn bare_invocation_defaults_to_crawl() {
        let cli = Cli::parse_from(["jobcrawl"]);
        assert!(cli.command.is_none());
    }
}
