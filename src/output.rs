//! Output formatting and persistence for result series.
//!
//! Every series is written as a two-column CSV with a `datetime,value` header.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::parser::{parse_cell, parse_timestamp};
use crate::table::{IndexLabel, Series};

pub const INDEX_HEADER: &str = "datetime";
pub const VALUE_HEADER: &str = "value";

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Renders a float in shortest round-trip form, keeping a `.0` on integral
/// values. Exponents carry a sign and at least two digits (`1e+16`, `1e-05`).
pub fn format_float(v: f64) -> String {
    let repr = format!("{v:?}");
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Renders an observed value with [`format_float`]. Missing values render as
/// an empty field.
pub fn format_value(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Writes `series` to `path`, replacing any existing file.
pub fn write_series(path: &Path, series: &Series) -> Result<()> {
    debug!(path = %path.display(), rows = series.len(), "Writing series");

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    writer.write_record([INDEX_HEADER, VALUE_HEADER])?;
    for (ts, value) in series.iter() {
        writer.write_record([series.label().format(ts), format_value(*value)])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    Ok(())
}

/// Reads back a file produced by [`write_series`].
///
/// The index label is inferred from the first row: a bare date means the
/// series was daily.
pub fn read_series(path: &Path) -> Result<Series> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = rdr.headers()?.clone();
    anyhow::ensure!(
        headers.iter().eq([INDEX_HEADER, VALUE_HEADER]),
        "unexpected header {:?} in {}",
        headers,
        path.display()
    );

    let mut series: Option<Series> = None;
    for result in rdr.records() {
        let record = result?;
        let raw_ts = record.get(0).unwrap_or_default();
        let ts = parse_timestamp(raw_ts)?;
        let value = parse_cell(record.get(1).unwrap_or_default())?;

        series
            .get_or_insert_with(|| {
                let label = if raw_ts.len() == 10 {
                    IndexLabel::Date
                } else {
                    IndexLabel::Timestamp
                };
                Series::new(label)
            })
            .push(ts, value);
    }

    Ok(series.unwrap_or_else(|| Series::new(IndexLabel::Timestamp)))
}
