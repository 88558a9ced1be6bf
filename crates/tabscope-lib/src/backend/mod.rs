//! Table backend adapters.
//!
//! The engine talks to table storage only through [`TableBackend`]. A backend
//! must answer shape and per-column metadata questions and be able to gather
//! cells by row position; every other primitive has a default implementation
//! written over `gather` that a backend may replace with a native version.

pub mod dataframe;
pub mod predicate;
pub mod records;

use std::collections::HashMap;
use std::fmt;

use crate::comm::{ColumnDisplayType, RowFilterKind};
use crate::error::{BackendError, BackendResult};
use crate::scalar::Scalar;
use crate::statistics;

pub use self::dataframe::PolarsBackend;
pub use self::records::RecordsBackend;

/// Which family of table a backend wraps. Replacing a table with one of a
/// different kind discards all view state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Polars,
    Records,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Polars => write!(f, "polars"),
            BackendKind::Records => write!(f, "records"),
        }
    }
}

/// Aggregates over the present numeric values of a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericSummary {
    /// Non-null, non-NaN values seen.
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// `None` when the column holds an infinite value.
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub stdev: Option<f64>,
    pub has_infinite: bool,
    pub is_integer: bool,
}

pub trait TableBackend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    fn num_rows(&self) -> usize;

    fn num_columns(&self) -> usize;

    fn column_name(&self, column: usize) -> BackendResult<String>;

    /// Backend-specific type tag.
    fn column_type_name(&self, column: usize) -> BackendResult<String>;

    fn column_type_display(&self, column: usize) -> BackendResult<ColumnDisplayType>;

    /// Effective value type of a dynamically typed column, found by scanning
    /// its values. `None` for statically typed columns.
    fn infer_column_type(&self, _column: usize) -> BackendResult<Option<String>> {
        Ok(None)
    }

    fn column_timezone(&self, _column: usize) -> BackendResult<Option<String>> {
        Ok(None)
    }

    /// Cells of `column` at `rows`, in that order; all rows when `rows` is `None`.
    fn gather(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<Vec<Scalar>>;

    fn has_row_labels(&self) -> bool {
        false
    }

    fn row_labels(&self, _rows: &[usize]) -> BackendResult<Vec<String>> {
        Err(BackendError::NotImplemented("row_labels"))
    }

    /// One entry per table row. `None` marks a row whose value was missing.
    fn filter_mask(
        &self,
        column: usize,
        kind: &RowFilterKind,
        display: ColumnDisplayType,
    ) -> BackendResult<Vec<Option<bool>>> {
        let values = self.gather(column, None)?;
        predicate::evaluate(&values, kind, display)
    }

    /// Stable ordering of `rows` (or all rows) by the values of `column`.
    /// Returns row positions, not offsets into `rows`.
    fn argsort(
        &self,
        column: usize,
        rows: Option<&[usize]>,
        ascending: bool,
    ) -> BackendResult<Vec<usize>> {
        let values = self.gather(column, rows)?;
        Ok(stable_argsort(&values, rows, ascending))
    }

    fn null_count(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<u64> {
        let values = self.gather(column, rows)?;
        Ok(values.iter().filter(|v| v.is_null()).count() as u64)
    }

    fn numeric_summary(
        &self,
        column: usize,
        rows: Option<&[usize]>,
    ) -> BackendResult<NumericSummary> {
        let values = self.gather(column, rows)?;
        summarize_numeric(&values)
    }

    /// Distinct present values with their counts, most frequent first. Ties
    /// keep the order in which values first appear.
    fn value_counts(
        &self,
        column: usize,
        rows: Option<&[usize]>,
    ) -> BackendResult<Vec<(Scalar, u64)>> {
        let values = self.gather(column, rows)?;
        Ok(count_values(values))
    }

    fn count_distinct(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<u64> {
        Ok(self.value_counts(column, rows)?.len() as u64)
    }
}

pub(crate) fn check_column(column: usize, num_columns: usize) -> BackendResult<()> {
    if column >= num_columns {
        return Err(BackendError::ColumnOutOfRange {
            index: column,
            num_columns,
        });
    }
    Ok(())
}

pub(crate) fn stable_argsort(values: &[Scalar], rows: Option<&[usize]>, ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].cmp_for_sort(&values[b], ascending));
    match rows {
        Some(rows) => order.into_iter().map(|i| rows[i]).collect(),
        None => order,
    }
}

pub(crate) fn summarize_numeric(values: &[Scalar]) -> BackendResult<NumericSummary> {
    let mut nums = Vec::with_capacity(values.len());
    let mut is_integer = true;
    for v in values {
        if v.is_missing() {
            continue;
        }
        match v {
            Scalar::Int(i) => nums.push(*i as f64),
            Scalar::Float(f) => {
                is_integer = false;
                nums.push(*f);
            }
            other => {
                return Err(BackendError::evaluation(format!(
                    "non-numeric value '{}' in numeric column",
                    other.to_raw_string()
                )))
            }
        }
    }
    Ok(summarize_f64(nums, is_integer))
}

/// Builds a summary from present (non-NaN) values.
pub(crate) fn summarize_f64(mut nums: Vec<f64>, is_integer: bool) -> NumericSummary {
    let count = nums.len();
    if count == 0 {
        return NumericSummary {
            is_integer,
            ..NumericSummary::default()
        };
    }
    nums.sort_by(|a, b| a.total_cmp(b));
    let has_infinite = nums.iter().any(|v| v.is_infinite());
    let (mean, median, stdev) = if has_infinite {
        (None, None, None)
    } else {
        (
            Some(statistics::mean(&nums)),
            statistics::quantile_sorted(&nums, 0.5),
            statistics::sample_std(&nums),
        )
    };
    NumericSummary {
        count,
        min: nums.first().copied(),
        max: nums.last().copied(),
        mean,
        median,
        stdev,
        has_infinite,
        is_integer,
    }
}

pub(crate) fn count_values(values: Vec<Scalar>) -> Vec<(Scalar, u64)> {
    let mut slots: HashMap<(u8, String), usize> = HashMap::new();
    let mut groups: Vec<(Scalar, u64)> = Vec::new();
    for v in values {
        if v.is_null() {
            continue;
        }
        let key = v.group_key();
        match slots.get(&key) {
            Some(&slot) => groups[slot].1 += 1,
            None => {
                slots.insert(key, groups.len());
                groups.push((v, 1));
            }
        }
    }
    // Stable sort keeps first-appearance order among equal counts.
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argsort_is_stable_and_maps_rows() {
        let values = vec![
            Scalar::Int(2),
            Scalar::Null,
            Scalar::Int(1),
            Scalar::Int(2),
        ];
        let rows = [10, 11, 12, 13];
        assert_eq!(stable_argsort(&values, Some(&rows), true), vec![12, 10, 13, 11]);
        assert_eq!(stable_argsort(&values, Some(&rows), false), vec![10, 13, 12, 11]);
    }

    #[test]
    fn value_counts_break_ties_by_first_appearance() {
        let values = vec![
            Scalar::Str("b".into()),
            Scalar::Str("a".into()),
            Scalar::Null,
            Scalar::Str("a".into()),
            Scalar::Str("c".into()),
            Scalar::Str("b".into()),
            Scalar::Str("c".into()),
        ];
        let counts = count_values(values);
        let names: Vec<String> = counts.iter().map(|(v, _)| v.to_raw_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(counts.iter().all(|(_, c)| *c == 2));
    }

    #[test]
    fn infinite_values_suppress_moments() {
        let summary = summarize_numeric(&[
            Scalar::Float(1.0),
            Scalar::Float(f64::INFINITY),
            Scalar::Null,
        ])
        .unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min, Some(1.0));
        assert_eq!(summary.max, Some(f64::INFINITY));
        assert!(summary.has_infinite);
        assert!(summary.mean.is_none() && summary.median.is_none() && summary.stdev.is_none());
    }

    #[test]
    fn integer_summary() {
        let summary =
            summarize_numeric(&[Scalar::Int(1), Scalar::Int(2), Scalar::Int(3), Scalar::Int(4)])
                .unwrap();
        assert!(summary.is_integer);
        assert_eq!(summary.mean, Some(2.5));
        assert_eq!(summary.median, Some(2.5));
        let sd = summary.stdev.unwrap();
        assert!((sd - 1.2909944487358056).abs() < 1e-12);
    }
}
