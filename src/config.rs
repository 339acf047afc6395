use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::stats::validate_percentile;
use crate::summary::DEFAULT_PERCENTILES;

pub const DEFAULT_INPUT: &str = "load_sims_full_stack_202412.csv";
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Optional run settings stored as a JSON object on disk; every key may be omitted:
/// ```json
/// {
///   "input": "load_sims_full_stack_202412.csv",
///   "output_dir": "summaries",
///   "percentiles": [0.25, 0.5, 0.75, 0.99],
///   "concurrency": 4,
///   "calendar_months": false
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub percentiles: Option<Vec<f64>>,
    pub concurrency: Option<usize>,
    pub calendar_months: Option<bool>,
}

impl RunConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Fills every unset key from `overrides` first, then from the file, then
    /// from the built-in defaults.
    pub fn resolve(&self, overrides: &RunConfig) -> Result<ResolvedConfig> {
        let percentiles = overrides
            .percentiles
            .clone()
            .or_else(|| self.percentiles.clone())
            .unwrap_or_else(|| DEFAULT_PERCENTILES.to_vec());
        anyhow::ensure!(!percentiles.is_empty(), "no percentiles configured");
        for &p in &percentiles {
            validate_percentile(p)?;
        }

        let concurrency = overrides
            .concurrency
            .or(self.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        anyhow::ensure!(concurrency > 0, "concurrency must be at least 1");

        Ok(ResolvedConfig {
            input: overrides
                .input
                .clone()
                .or_else(|| self.input.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT)),
            output_dir: overrides
                .output_dir
                .clone()
                .or_else(|| self.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            percentiles,
            concurrency,
            calendar_months: overrides
                .calendar_months
                .or(self.calendar_months)
                .unwrap_or(false),
        })
    }
}

/// Fully resolved settings for a `summarize` run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub percentiles: Vec<f64>,
    pub concurrency: usize,
    pub calendar_months: bool,
}
