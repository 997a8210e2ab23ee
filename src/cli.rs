use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use placescrape::config::{AppConfig, ConfigOverrides, StorageBackend};
use placescrape::core::JobStatus;
use placescrape::export::{self, ExportFormat};
use placescrape::scraper::browser::PlaywrightLauncher;
use placescrape::{PlaceScrapeService, Record};

#[derive(Parser)]
#[command(name = "placescrape-cli")]
#[command(about = "PlaceScrape Command Line Interface")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(short, long, help = "Configuration file path")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape listings for one or more search queries
    Scrape {
        #[arg(required = true, help = "Search queries, each run as its own job")]
        queries: Vec<String>,

        #[arg(short, long, default_value_t = 10, help = "Number of records per query (1-100)")]
        total: i64,

        #[arg(short, long, help = "Output file path")]
        output: PathBuf,

        #[arg(short, long, help = "Output format (defaults to the output file extension)", value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum OutputFormat {
    Csv,
    Json,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Csv => ExportFormat::Csv,
            OutputFormat::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("placescrape={}", log_level))),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("PlaceScrape CLI v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        AppConfig::load_from_file(config_path).await?
    } else {
        AppConfig::load().await?
    };
    ConfigOverrides::apply(&mut config);
    config.validate()?;

    match cli.command {
        Commands::Scrape {
            queries,
            total,
            output,
            format,
        } => {
            let format = format
                .map(ExportFormat::from)
                .or_else(|| ExportFormat::from_path(&output))
                .unwrap_or(ExportFormat::Csv);
            execute_scrape(config, queries, total, output, format).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Reject the whole batch before any job starts if one query is invalid
fn check_queries(service: &PlaceScrapeService, queries: &[String], total: i64) -> Result<()> {
    let problems: Vec<String> = queries
        .iter()
        .filter_map(|query| {
            service
                .validate_submission(query, total)
                .err()
                .map(|e| format!("\"{}\": {}", query, e))
        })
        .collect();

    if problems.is_empty() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Invalid queries, nothing was started:\n{}", problems.join("\n")))
    }
}

async fn execute_scrape(
    mut config: AppConfig,
    queries: Vec<String>,
    total: i64,
    output: PathBuf,
    format: ExportFormat,
) -> Result<()> {
    // One-shot runs keep nothing once the export is written
    config.storage.backend = StorageBackend::Memory;

    let launcher = Arc::new(PlaywrightLauncher::new(&config.scraping).await?);
    let service = PlaceScrapeService::new(config, launcher)?;

    check_queries(&service, &queries, total)?;

    let mut failures = 0;
    let mut job_ids = Vec::with_capacity(queries.len());
    for query in &queries {
        match service.submit(query, total) {
            Ok(job) => {
                println!("Started {} for \"{}\"", job.id, job.query);
                job_ids.push(job.id);
            }
            Err(e) => {
                failures += 1;
                warn!("Query \"{}\" rejected: {}", query, e);
                println!("\"{}\": rejected: {}", query, e);
            }
        }
    }

    let finished = futures::future::join_all(
        job_ids
            .iter()
            .map(|job_id| service.wait_for_job(job_id, Duration::from_millis(500))),
    )
    .await;

    let mut records: Vec<Record> = Vec::new();
    for job in finished {
        let job = job?;
        match job.status {
            JobStatus::Completed => {
                let results = service.get_results(&job.id).await?;
                println!(
                    "{}: {} of {} records ({})",
                    job.id,
                    results.count,
                    job.requested_count,
                    job.outcome.map(|o| o.to_string()).unwrap_or_default()
                );
                records.extend(results.data);
            }
            _ => {
                failures += 1;
                warn!("Job {} failed: {}", job.id, job.error.as_deref().unwrap_or("unknown error"));
                println!("{}: failed: {}", job.id, job.error.unwrap_or_default());
            }
        }
    }

    export::export_to_file(&records, &output, format).await?;
    println!("Results exported to: {} ({} records)", output.display(), records.len());

    if failures == queries.len() {
        return Err(anyhow::anyhow!("All {} jobs failed", failures));
    }
    Ok(())
}
