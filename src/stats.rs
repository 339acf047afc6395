//! Null-skipping reductions and the linear-interpolation quantile.

use std::fmt;

/// Reduction applied to every column of a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reduction {
    Min,
    Mean,
    Max,
}

impl Reduction {
    pub const ALL: [Reduction; 3] = [Reduction::Min, Reduction::Mean, Reduction::Max];

    /// Reduces the present values. Returns `None` when every value is missing.
    pub fn apply<I>(&self, values: I) -> Option<f64>
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let present = values.into_iter().flatten();
        match self {
            Reduction::Min => present.reduce(f64::min),
            Reduction::Max => present.reduce(f64::max),
            Reduction::Mean => mean(present),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Min => "min",
            Reduction::Mean => "mean",
            Reduction::Max => "max",
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arithmetic mean of the yielded values, `None` for an empty iterator.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Checks that `p` is a usable quantile level.
pub fn validate_percentile(p: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&p),
        "percentile {p} is outside [0, 1]"
    );
    Ok(())
}

/// The `p`-th quantile of the present values, linearly interpolated between
/// the two closest ranks (`h = p * (n - 1)`).
///
/// Missing and NaN values are skipped. Returns `None` when nothing is left.
/// `p` must already be within `[0, 1]`, see [`validate_percentile`].
pub fn quantile<I>(values: I, p: f64) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sorted: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    Some(quantile_sorted(&sorted, p))
}

/// Same as [`quantile`] for an already sorted, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;

    if lo == hi {
        sorted[lo]
    } else {
        let w = h - lo as f64;
        sorted[lo] + w * (sorted[hi] - sorted[lo])
    }
}
