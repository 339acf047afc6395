//! Percentile summaries of an observation table.
//!
//! For each percentile the table is summarized seven ways: the hourly
//! cross-section and the cross-section of the daily min, mean and max tables,
//! the latter three written once under a `daily_` and once under a `monthly_`
//! name.

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, debug, info};

use crate::output::{format_float, write_series};
use crate::resample::{Bucket, resample};
use crate::stats::{Reduction, quantile, validate_percentile};
use crate::table::{ObservationTable, Series};

/// Percentiles summarized when none are configured.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.25, 0.5, 0.75, 0.99];

/// One of the seven derived series written per percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Hourly,
    DailyMin,
    MonthlyMin,
    DailyMax,
    MonthlyMax,
    DailyMean,
    MonthlyMean,
}

impl AggregateKind {
    /// Output order for one percentile.
    pub const ALL: [AggregateKind; 7] = [
        AggregateKind::Hourly,
        AggregateKind::DailyMin,
        AggregateKind::MonthlyMin,
        AggregateKind::DailyMax,
        AggregateKind::MonthlyMax,
        AggregateKind::DailyMean,
        AggregateKind::MonthlyMean,
    ];

    /// File name for this kind at percentile `p`, e.g. `daily_min_0.25.csv`.
    pub fn file_name(&self, p: f64) -> String {
        let p = percentile_label(p);
        match self {
            AggregateKind::Hourly => format!("hourly_data_{p}P.csv"),
            AggregateKind::DailyMin => format!("daily_min_{p}.csv"),
            AggregateKind::MonthlyMin => format!("monthly_min_{p}.csv"),
            AggregateKind::DailyMax => format!("daily_max_{p}.csv"),
            AggregateKind::MonthlyMax => format!("monthly_max_{p}.csv"),
            AggregateKind::DailyMean => format!("daily_mean_{p}.csv"),
            AggregateKind::MonthlyMean => format!("monthly_mean_{p}.csv"),
        }
    }

    /// The per-bucket reduction, `None` for the unresampled hourly series.
    pub fn reduction(&self) -> Option<Reduction> {
        match self {
            AggregateKind::Hourly => None,
            AggregateKind::DailyMin | AggregateKind::MonthlyMin => Some(Reduction::Min),
            AggregateKind::DailyMax | AggregateKind::MonthlyMax => Some(Reduction::Max),
            AggregateKind::DailyMean | AggregateKind::MonthlyMean => Some(Reduction::Mean),
        }
    }

    /// Bucket width used for this kind.
    ///
    /// `monthly_*` outputs are day-bucketed, matching the files downstream
    /// consumers already read, unless `calendar_months` is set.
    pub fn bucket(&self, calendar_months: bool) -> Option<Bucket> {
        match self {
            AggregateKind::Hourly => None,
            AggregateKind::DailyMin | AggregateKind::DailyMax | AggregateKind::DailyMean => {
                Some(Bucket::Day)
            }
            AggregateKind::MonthlyMin | AggregateKind::MonthlyMax | AggregateKind::MonthlyMean => {
                if calendar_months {
                    Some(Bucket::Month)
                } else {
                    Some(Bucket::Day)
                }
            }
        }
    }
}

/// Shortest decimal form of a percentile as used in file names (`0.5`, `1.0`, `1e-05`).
pub fn percentile_label(p: f64) -> String {
    format_float(p)
}

/// Options shared by every percentile of a run.
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub output_dir: PathBuf,
    pub calendar_months: bool,
}

/// One written output file.
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub kind: AggregateKind,
    pub percentile: f64,
    pub path: PathBuf,
    pub rows: usize,
    pub missing: usize,
}

/// Everything a `summarize` run wrote, logged as JSON at the end of the run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub days: usize,
    pub outputs: Vec<OutputReport>,
}

/// Row-wise quantile across the columns of `table`, keeping its index and label.
pub fn cross_section_quantile(table: &ObservationTable, p: f64) -> Series {
    let mut series = Series::new(table.label());
    for (ts, row) in table.iter_rows() {
        series.push(*ts, quantile(row.iter().copied(), p));
    }
    series
}

/// Computes the series for one kind at percentile `p`.
pub fn compute(
    table: &ObservationTable,
    kind: AggregateKind,
    p: f64,
    calendar_months: bool,
) -> Result<Series> {
    validate_percentile(p)?;

    match (kind.bucket(calendar_months), kind.reduction()) {
        (Some(bucket), Some(reduction)) => {
            let reduced = resample(table, bucket, reduction)?;
            Ok(cross_section_quantile(&reduced, p))
        }
        _ => Ok(cross_section_quantile(table, p)),
    }
}

/// Computes and writes all seven outputs for percentile `p`.
///
/// Stops at the first failure; files already written are left in place.
#[tracing::instrument(skip(table, options), fields(output_dir = %options.output_dir.display()))]
pub fn summarize_percentile(
    table: &ObservationTable,
    p: f64,
    options: &SummaryOptions,
) -> Result<Vec<OutputReport>> {
    validate_percentile(p)?;

    let mut reports = Vec::with_capacity(AggregateKind::ALL.len());
    for kind in AggregateKind::ALL {
        let series = compute(table, kind, p, options.calendar_months)?;
        let path = options.output_dir.join(kind.file_name(p));
        write_series(&path, &series)?;

        let missing = series.values().iter().filter(|v| v.is_none()).count();
        debug!(?kind, path = %path.display(), rows = series.len(), missing, "Output written");

        reports.push(OutputReport {
            kind,
            percentile: p,
            path,
            rows: series.len(),
            missing,
        });
    }

    info!(files = reports.len(), "Percentile summarized");
    Ok(reports)
}

/// Summarizes every percentile in order on the current thread.
///
/// Library entry point for callers without a tokio runtime; the CLI uses
/// [`summarize_concurrent`].
pub fn summarize(
    table: &ObservationTable,
    percentiles: &[f64],
    options: &SummaryOptions,
) -> Result<Vec<OutputReport>> {
    for &p in percentiles {
        validate_percentile(p)?;
    }

    let mut reports = Vec::with_capacity(percentiles.len() * AggregateKind::ALL.len());
    for &p in percentiles {
        reports.extend(summarize_percentile(table, p, options)?);
    }
    Ok(reports)
}

/// Summarizes percentiles on the blocking pool, at most `concurrency` at a time.
///
/// All percentiles are validated before anything is written. Reports come
/// back in percentile order and the first failing percentile fails the call.
pub async fn summarize_concurrent(
    table: Arc<ObservationTable>,
    percentiles: &[f64],
    options: Arc<SummaryOptions>,
    concurrency: usize,
) -> Result<Vec<OutputReport>> {
    anyhow::ensure!(concurrency > 0, "concurrency must be at least 1");
    for &p in percentiles {
        validate_percentile(p)?;
    }

    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
    let mut tasks = Vec::with_capacity(percentiles.len());

    for &p in percentiles {
        let sem = semaphore.clone();
        let table = table.clone();
        let options = options.clone();

        let percentile_span = tracing::info_span!("percentile", percentile = p);

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await?;

                let span = tracing::Span::current();
                let reports = tokio::task::spawn_blocking(move || {
                    span.in_scope(|| summarize_percentile(&table, p, &options))
                })
                .await??;

                Ok::<_, anyhow::Error>(reports)
            }
            .instrument(percentile_span),
        );

        tasks.push(task);
    }

    let mut outputs = Vec::with_capacity(percentiles.len() * AggregateKind::ALL.len());
    for task in tasks {
        outputs.extend(task.await??);
    }
    Ok(outputs)
}

/// Output paths a run over `percentiles` will produce, in write order.
pub fn planned_outputs(dir: &Path, percentiles: &[f64]) -> Vec<PathBuf> {
    percentiles
        .iter()
        .flat_map(|&p| AggregateKind::ALL.into_iter().map(move |k| dir.join(k.file_name(p))))
        .collect()
}
