//! CLI entry point for the simulation quantile summarizer.
//!
//! Provides subcommands for writing the full set of percentile summaries,
//! inspecting an input table, and computing a single hourly cross-section.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sim_quantiles::config::{DEFAULT_INPUT, RunConfig};
use sim_quantiles::output::{print_json, write_series};
use sim_quantiles::parser::load_table;
use sim_quantiles::stats::validate_percentile;
use sim_quantiles::summary::{
    AggregateKind, RunSummary, SummaryOptions, cross_section_quantile, summarize_concurrent,
};
use sim_quantiles::table::ObservationTable;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "sim_quantiles")]
#[command(about = "Percentile summaries of multi-run simulation output", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write hourly, daily and monthly percentile summaries for every percentile
    Summarize {
        /// CSV file (optionally .gz) with a timestamp column followed by one column per run
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Directory the summary CSVs are written to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Comma-separated percentiles in [0, 1]
        #[arg(short, long, value_delimiter = ',')]
        percentiles: Option<Vec<f64>>,

        /// Maximum number of percentiles summarized at once
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// JSON run config; explicit flags take precedence over it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Bucket monthly_* outputs by calendar month instead of by day
        #[arg(long, default_value_t = false)]
        calendar_months: bool,

        /// Log the run summary as JSON when finished
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Load an input table and log its shape
    Inspect {
        #[arg(value_name = "INPUT", default_value = DEFAULT_INPUT)]
        input: PathBuf,
    },
    /// Write the hourly cross-sectional quantile for a single percentile
    Quantile {
        #[arg(value_name = "INPUT", default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Percentile in [0, 1]
        #[arg(short, long)]
        percentile: f64,

        /// Output CSV (defaults to hourly_data_{P}P.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/sim_quantiles.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("sim_quantiles.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Summarize {
            input,
            output_dir,
            percentiles,
            concurrency,
            config,
            calendar_months,
            json,
        } => {
            let file_config = match config {
                Some(path) => RunConfig::load(&path)?,
                None => RunConfig::default(),
            };
            let overrides = RunConfig {
                input,
                output_dir,
                percentiles,
                concurrency,
                calendar_months: calendar_months.then_some(true),
            };
            let resolved = file_config.resolve(&overrides)?;
            debug!(?resolved, "Run configuration resolved");

            let summary = summarize_all(
                resolved.input,
                resolved.output_dir,
                resolved.percentiles,
                resolved.concurrency,
                resolved.calendar_months,
            )
            .await?;

            if json {
                print_json(&summary)?;
            }
        }
        Commands::Inspect { input } => {
            let table = load(input.clone()).await?;

            info!(
                input = %input.display(),
                rows = table.height(),
                columns = table.width(),
                first = ?table.first_timestamp(),
                last = ?table.last_timestamp(),
                days_spanned = table.days_spanned(),
                days_present = table.distinct_days().len(),
                missing_cells = table.missing_cells(),
                duplicate_timestamps = table.duplicate_timestamps(),
                "Observation table"
            );
        }
        Commands::Quantile {
            input,
            percentile,
            output,
        } => {
            validate_percentile(percentile)?;
            let table = load(input).await?;

            let output =
                output.unwrap_or_else(|| PathBuf::from(AggregateKind::Hourly.file_name(percentile)));
            let series = cross_section_quantile(&table, percentile);
            write_series(&output, &series)?;

            info!(output = %output.display(), rows = series.len(), "Hourly quantile written");
        }
    }

    Ok(())
}

/// Parses the input table on the blocking pool.
async fn load(input: PathBuf) -> Result<ObservationTable> {
    tokio::task::spawn_blocking(move || load_table(&input)).await?
}

/// Loads the input once and writes all outputs, summarizing up to
/// `concurrency` percentiles at a time. The first failing percentile fails the run.
#[tracing::instrument(
    skip_all,
    fields(input = %input.display(), output_dir = %output_dir.display(), percentile_count = percentiles.len())
)]
async fn summarize_all(
    input: PathBuf,
    output_dir: PathBuf,
    percentiles: Vec<f64>,
    concurrency: usize,
    calendar_months: bool,
) -> Result<RunSummary> {
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    let table = Arc::new(load(input.clone()).await?);
    info!(
        rows = table.height(),
        columns = table.width(),
        days = table.days_spanned(),
        "Observation table loaded"
    );

    let options = Arc::new(SummaryOptions {
        output_dir,
        calendar_months,
    });
    let outputs = summarize_concurrent(table.clone(), &percentiles, options, concurrency).await?;

    info!(files = outputs.len(), "Finished writing summaries");

    Ok(RunSummary {
        input,
        rows: table.height(),
        columns: table.width(),
        days: table.days_spanned(),
        outputs,
    })
}
