//! Calendar bucketing of an observation table.
//!
//! Buckets are contiguous: every bucket between the first and the last one
//! holding data is emitted, so days without any rows appear with all values
//! missing. Bucket ids count forward from the bucket of the earliest row and
//! are monotonic in time.

use anyhow::{Context, Result};
use chrono::{Datelike, Days, NaiveDate, NaiveTime};
use std::fmt;

use crate::stats::Reduction;
use crate::table::{IndexLabel, ObservationTable};

/// Width of a resampling bucket, aligned to the naive calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Day,
    Month,
}

impl Bucket {
    /// First day of the bucket holding `date`.
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Bucket::Day => date,
            Bucket::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Number of whole buckets between the buckets of `origin` and `date`.
    fn offset(&self, origin: NaiveDate, date: NaiveDate) -> usize {
        match self {
            Bucket::Day => (date - origin).num_days() as usize,
            Bucket::Month => (month_ordinal(date) - month_ordinal(origin)) as usize,
        }
    }

    /// Start of the `n`-th bucket after the bucket beginning at `origin`.
    fn nth_start(&self, origin: NaiveDate, n: usize) -> Option<NaiveDate> {
        match self {
            Bucket::Day => origin.checked_add_days(Days::new(n as u64)),
            Bucket::Month => {
                let ordinal = month_ordinal(origin) + n as i32;
                let (year, month0) = (ordinal.div_euclid(12), ordinal.rem_euclid(12));
                NaiveDate::from_ymd_opt(year, month0 as u32 + 1, 1)
            }
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Day => f.write_str("day"),
            Bucket::Month => f.write_str("month"),
        }
    }
}

fn month_ordinal(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// Reduces every column of `table` within each calendar bucket.
///
/// The result has one row per bucket from the earliest to the latest bucket
/// present, indexed by the bucket's first day at midnight and labelled as a
/// date. A column with no present value in a bucket reduces to `None`.
#[tracing::instrument(skip(table), fields(rows = table.height(), columns = table.width()))]
pub fn resample(
    table: &ObservationTable,
    bucket: Bucket,
    reduction: Reduction,
) -> Result<ObservationTable> {
    let columns = table.columns().to_vec();

    let (Some(first), Some(last)) = (table.first_timestamp(), table.last_timestamp()) else {
        return ObservationTable::new(Vec::new(), columns, Vec::new(), IndexLabel::Date);
    };

    let origin = bucket.start_of(first.date());
    let bucket_count = bucket.offset(origin, last.date()) + 1;

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); bucket_count];
    for (i, ts) in table.index().iter().enumerate() {
        members[bucket.offset(origin, ts.date())].push(i);
    }

    let mut index = Vec::with_capacity(bucket_count);
    let mut rows = Vec::with_capacity(bucket_count);

    for (n, row_ids) in members.iter().enumerate() {
        let start = bucket
            .nth_start(origin, n)
            .with_context(|| format!("{bucket} bucket {n} after {origin} is out of range"))?;
        index.push(start.and_time(NaiveTime::MIN));

        let reduced: Vec<Option<f64>> = (0..columns.len())
            .map(|col| reduction.apply(row_ids.iter().map(|&r| table.rows[r][col])))
            .collect();
        rows.push(reduced);
    }

    ObservationTable::new(index, columns, rows, IndexLabel::Date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn day(s: &str) -> NaiveDateTime {
        ts(&format!("{s} 00:00:00"))
    }

    fn hourly_table() -> ObservationTable {
        ObservationTable::new(
            vec![
                ts("2024-12-01 00:00:00"),
                ts("2024-12-01 12:00:00"),
                ts("2024-12-01 23:00:00"),
                ts("2024-12-02 06:00:00"),
                ts("2024-12-04 06:00:00"),
            ],
            vec!["a".into(), "b".into()],
            vec![
                vec![Some(1.0), None],
                vec![Some(5.0), None],
                vec![Some(3.0), None],
                vec![Some(10.0), Some(7.0)],
                vec![None, Some(2.0)],
            ],
            IndexLabel::Timestamp,
        )
        .unwrap()
    }

    #[test]
    fn test_daily_min_mean_max() {
        let table = hourly_table();

        let min = resample(&table, Bucket::Day, Reduction::Min).unwrap();
        let mean = resample(&table, Bucket::Day, Reduction::Mean).unwrap();
        let max = resample(&table, Bucket::Day, Reduction::Max).unwrap();

        assert_eq!(min.rows[0], vec![Some(1.0), None]);
        assert_eq!(mean.rows[0], vec![Some(3.0), None]);
        assert_eq!(max.rows[0], vec![Some(5.0), None]);

        assert_eq!(min.rows[1], vec![Some(10.0), Some(7.0)]);
        assert_eq!(max.rows[3], vec![None, Some(2.0)]);
    }

    #[test]
    fn test_daily_fills_gap_days() {
        let daily = resample(&hourly_table(), Bucket::Day, Reduction::Mean).unwrap();

        assert_eq!(daily.height(), 4);
        assert_eq!(
            daily.index(),
            &[
                day("2024-12-01"),
                day("2024-12-02"),
                day("2024-12-03"),
                day("2024-12-04")
            ]
        );
        assert_eq!(daily.rows[2], vec![None, None]);
        assert_eq!(daily.label(), IndexLabel::Date);
    }

    #[test]
    fn test_daily_row_count_matches_days_spanned() {
        let table = hourly_table();
        let daily = resample(&table, Bucket::Day, Reduction::Max).unwrap();
        assert_eq!(daily.height(), table.days_spanned());
    }

    #[test]
    fn test_min_le_mean_le_max() {
        let table = hourly_table();
        let min = resample(&table, Bucket::Day, Reduction::Min).unwrap();
        let mean = resample(&table, Bucket::Day, Reduction::Mean).unwrap();
        let max = resample(&table, Bucket::Day, Reduction::Max).unwrap();

        for d in 0..min.height() {
            for c in 0..min.width() {
                let cells = (min.rows[d][c], mean.rows[d][c], max.rows[d][c]);
                if let (Some(lo), Some(mid), Some(hi)) = cells {
                    assert!(lo <= mid && mid <= hi, "day {d} column {c}");
                }
            }
        }
    }

    #[test]
    fn test_unordered_input_is_bucketed_by_day() {
        let table = ObservationTable::new(
            vec![ts("2024-12-02 01:00:00"), ts("2024-12-01 01:00:00")],
            vec!["a".into()],
            vec![vec![Some(2.0)], vec![Some(1.0)]],
            IndexLabel::Timestamp,
        )
        .unwrap();

        let daily = resample(&table, Bucket::Day, Reduction::Min).unwrap();
        assert_eq!(daily.index(), &[day("2024-12-01"), day("2024-12-02")]);
        assert_eq!(daily.rows, vec![vec![Some(1.0)], vec![Some(2.0)]]);
    }

    #[test]
    fn test_monthly_buckets_cross_year() {
        let table = ObservationTable::new(
            vec![
                ts("2024-11-30 23:00:00"),
                ts("2024-12-15 00:00:00"),
                ts("2025-01-02 00:00:00"),
            ],
            vec!["a".into()],
            vec![vec![Some(1.0)], vec![Some(4.0)], vec![Some(6.0)]],
            IndexLabel::Timestamp,
        )
        .unwrap();

        let monthly = resample(&table, Bucket::Month, Reduction::Max).unwrap();
        assert_eq!(
            monthly.index(),
            &[day("2024-11-01"), day("2024-12-01"), day("2025-01-01")]
        );
        assert_eq!(
            monthly.rows,
            vec![vec![Some(1.0)], vec![Some(4.0)], vec![Some(6.0)]]
        );
    }

    #[test]
    fn test_empty_table() {
        let table =
            ObservationTable::new(vec![], vec!["a".into()], vec![], IndexLabel::Timestamp)
                .unwrap();
        let daily = resample(&table, Bucket::Day, Reduction::Mean).unwrap();
        assert!(daily.is_empty());
        assert_eq!(daily.width(), 1);
    }
}
