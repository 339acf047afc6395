//! CSV parser for observation tables.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::table::{IndexLabel, ObservationTable};

/// Cell spellings treated as a missing observation (compared case-insensitively).
/// Covers the NA spellings spreadsheet and dataframe exports commonly emit.
const MISSING_MARKERS: &[&str] = &[
    "", "nan", "-nan", "na", "n/a", "#na", "#n/a", "#n/a n/a", "<na>", "null", "none",
    "1.#ind", "-1.#ind", "1.#qnan", "-1.#qnan",
];

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Loads an observation table from a CSV file, gunzipping `*.gz` input.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any row fails to parse.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_table(path: &Path) -> Result<ObservationTable> {
    let file =
        File::open(path).with_context(|| format!("failed to open input {}", path.display()))?;

    let gzipped = path.extension().and_then(|e| e.to_str()) == Some("gz");
    debug!(gzipped, "Reading observation table");

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    parse_table(reader).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parses CSV text whose first column is a timestamp and whose remaining
/// columns are numeric observations.
///
/// The first header field is ignored. Rows keep their file order.
pub fn parse_table<R: Read>(reader: R) -> Result<ObservationTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("failed to read CSV header")?.clone();
    if headers.is_empty() {
        bail!("CSV header is empty");
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result.context("malformed CSV row")?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let raw_ts = record.get(0).unwrap_or_default();
        let ts = parse_timestamp(raw_ts).with_context(|| format!("line {line}"))?;

        let mut row = Vec::with_capacity(columns.len());
        for (col, cell) in columns.iter().zip(record.iter().skip(1)) {
            let value = parse_cell(cell)
                .with_context(|| format!("line {line}, column '{col}'"))?;
            row.push(value);
        }

        index.push(ts);
        rows.push(row);
    }

    let table = ObservationTable::new(index, columns, rows, IndexLabel::Timestamp)?;

    let duplicates = table.duplicate_timestamps();
    if duplicates > 0 {
        warn!(duplicates, "Input contains duplicate timestamps");
    }
    debug!(
        rows = table.height(),
        columns = table.width(),
        "Observation table parsed"
    );

    Ok(table)
}

/// Parses a timestamp into naive wall-clock time.
///
/// Timestamps with an offset are converted to UTC before the offset is
/// dropped. Timestamps without one are returned unchanged. A bare date is
/// read as midnight.
///
/// # Errors
///
/// Returns an error if `s` matches none of the accepted layouts.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.naive_utc());
        }
    }
    // Trailing `Z` without seconds or with a space separator.
    if let Some(utc) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        if let Some(ts) = parse_naive(utc.trim_end()) {
            return Ok(ts);
        }
    }
    if let Some(ts) = parse_naive(s) {
        return Ok(ts);
    }

    bail!("unparseable timestamp '{s}'")
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parses one observation cell. Missing markers yield `None`.
///
/// # Errors
///
/// Returns an error for any other text that is not a float.
pub fn parse_cell(cell: &str) -> Result<Option<f64>> {
    let cell = cell.trim();
    if MISSING_MARKERS
        .iter()
        .any(|marker| cell.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }

    let value: f64 = cell
        .parse()
        .with_context(|| format!("non-numeric value '{cell}'"))?;
    if value.is_nan() {
        return Ok(None);
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_timestamp_naive() {
        assert_eq!(
            parse_timestamp("2024-12-01 05:00:00").unwrap(),
            naive("2024-12-01 05:00:00")
        );
        assert_eq!(
            parse_timestamp("2024-12-01T05:30").unwrap(),
            naive("2024-12-01 05:30:00")
        );
        assert_eq!(
            parse_timestamp("2024-12-01").unwrap(),
            naive("2024-12-01 00:00:00")
        );
    }

    #[test]
    fn test_parse_timestamp_converts_offset_to_utc() {
        assert_eq!(
            parse_timestamp("2024-12-01 23:00:00-05:00").unwrap(),
            naive("2024-12-02 04:00:00")
        );
        assert_eq!(
            parse_timestamp("2024-12-01T02:00:00+0200").unwrap(),
            naive("2024-12-01 00:00:00")
        );
        assert_eq!(
            parse_timestamp("2024-12-01T05:00:00Z").unwrap(),
            naive("2024-12-01 05:00:00")
        );
        assert_eq!(
            parse_timestamp("2024-12-01 05:00:00+00:00").unwrap(),
            naive("2024-12-01 05:00:00")
        );
    }

    #[test]
    fn test_parse_timestamp_fractional_seconds() {
        let ts = parse_timestamp("2024-12-01 05:00:00.500").unwrap();
        assert_eq!(ts.and_utc().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("2024-13-01 00:00:00").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("1.25").unwrap(), Some(1.25));
        assert_eq!(parse_cell(" -3 ").unwrap(), Some(-3.0));
        assert_eq!(parse_cell("").unwrap(), None);
        assert_eq!(parse_cell("NaN").unwrap(), None);
        assert_eq!(parse_cell("NA").unwrap(), None);
        assert!(parse_cell("abc").is_err());
    }

    #[test]
    fn test_parse_cell_export_na_spellings() {
        for cell in [
            "#N/A", "#N/A N/A", "#NA", "<NA>", "-NaN", "-nan", "1.#QNAN", "-1.#QNAN", "1.#IND",
            "-1.#IND", "NULL", "None", "n/a",
        ] {
            assert_eq!(parse_cell(cell).unwrap(), None, "{cell}");
        }
        assert!(parse_cell("#VALUE!").is_err());
    }

    #[test]
    fn test_parse_table() {
        let csv = "\
,run_0,run_1
2024-12-01 00:00:00+00:00,1.0,2.0
2024-12-01 01:00:00+00:00,3.0,
";
        let table = parse_table(csv.as_bytes()).unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(table.width(), 2);
        assert_eq!(table.columns(), &["run_0".to_string(), "run_1".to_string()]);
        assert_eq!(table.rows[1], vec![Some(3.0), None]);
        assert_eq!(table.index()[1], naive("2024-12-01 01:00:00"));
    }

    #[test]
    fn test_parse_table_header_only() {
        let table = parse_table(",a,b\n".as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn test_parse_table_reports_line_and_column() {
        let csv = ",a,b\n2024-12-01 00:00:00,1.0,2.0\n2024-12-01 01:00:00,1.0,oops\n";
        let err = parse_table(csv.as_bytes()).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("line 3"), "{chain}");
        assert!(chain.contains("column 'b'"), "{chain}");
        assert!(chain.contains("oops"), "{chain}");
    }

    #[test]
    fn test_parse_table_bad_timestamp() {
        let csv = ",a\nnot-a-date,1.0\n";
        let err = parse_table(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("not-a-date"));
    }

    #[test]
    fn test_parse_table_ragged_row() {
        let csv = ",a,b\n2024-12-01 00:00:00,1.0\n";
        assert!(parse_table(csv.as_bytes()).is_err());
    }
}
