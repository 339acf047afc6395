//! In-memory observation table and single-column result series.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;

/// How an index value is rendered when a table or series is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLabel {
    /// `YYYY-MM-DD HH:MM:SS`, with `.fff` appended only for sub-second times
    Timestamp,
    /// `YYYY-MM-DD`
    Date,
}

impl IndexLabel {
    pub fn format(&self, ts: &NaiveDateTime) -> String {
        match self {
            IndexLabel::Timestamp => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            IndexLabel::Date => ts.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Rows of timestamped observations, one column per independent series.
///
/// Values are stored row-major. Missing cells are `None` and every reduction
/// in this crate skips them.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    pub(crate) index: Vec<NaiveDateTime>,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<Option<f64>>>,
    pub(crate) label: IndexLabel,
}

impl ObservationTable {
    /// Builds a table, checking that every row has one value per column.
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<f64>>>,
        label: IndexLabel,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            index.len() == rows.len(),
            "index has {} entries but table has {} rows",
            index.len(),
            rows.len()
        );
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            anyhow::bail!(
                "row {} has {} values, expected {}",
                i,
                row.len(),
                columns.len()
            );
        }

        Ok(Self {
            index,
            columns,
            rows,
            label,
        })
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn label(&self) -> IndexLabel {
        self.label
    }

    /// Iterates `(timestamp, row values)` pairs in table order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (&NaiveDateTime, &[Option<f64>])> {
        self.index.iter().zip(self.rows.iter().map(Vec::as_slice))
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.iter().min().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.index.iter().max().copied()
    }

    /// Number of calendar days from the first to the last day present, inclusive.
    pub fn days_spanned(&self) -> usize {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => (last.date() - first.date()).num_days() as usize + 1,
            _ => 0,
        }
    }

    pub fn distinct_days(&self) -> HashSet<NaiveDate> {
        self.index.iter().map(NaiveDateTime::date).collect()
    }

    /// Number of rows whose timestamp already appeared earlier in the table.
    pub fn duplicate_timestamps(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.index.len());
        self.index.iter().filter(|ts| !seen.insert(**ts)).count()
    }

    pub fn missing_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|v| v.is_none()).count())
            .sum()
    }
}

/// A derived single-value series, written as `datetime,value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub(crate) index: Vec<NaiveDateTime>,
    pub(crate) values: Vec<Option<f64>>,
    pub(crate) label: IndexLabel,
}

impl Series {
    pub fn new(label: IndexLabel) -> Self {
        Self {
            index: Vec::new(),
            values: Vec::new(),
            label,
        }
    }

    pub fn push(&mut self, ts: NaiveDateTime, value: Option<f64>) {
        self.index.push(ts);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn label(&self) -> IndexLabel {
        self.label
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDateTime, &Option<f64>)> {
        self.index.iter().zip(self.values.iter())
    }
}
