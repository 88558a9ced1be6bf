//! Backend over an in-memory polars `DataFrame`.

use polars::prelude::*;

use super::{
    check_column, count_values, predicate, stable_argsort, summarize_numeric, BackendKind,
    NumericSummary, TableBackend,
};
use crate::comm::{ColumnDisplayType, RowFilterKind};
use crate::error::{BackendError, BackendResult};
use crate::scalar::{self, Scalar};

#[derive(Debug, Clone)]
pub struct PolarsBackend {
    df: DataFrame,
}

impl PolarsBackend {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    fn series(&self, column: usize) -> BackendResult<&Series> {
        check_column(column, self.df.width())?;
        Ok(self.df.get_columns()[column].as_materialized_series())
    }

    /// The column restricted to `rows`, in that order.
    fn subset(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<Series> {
        let series = self.series(column)?;
        match rows {
            None => Ok(series.clone()),
            Some(rows) => {
                let idx: Vec<IdxSize> = rows.iter().map(|&r| r as IdxSize).collect();
                let idx = IdxCa::new("rows".into(), idx);
                Ok(series.take(&idx)?)
            }
        }
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float()
}

fn cell_unit(unit: &TimeUnit) -> scalar::TimeUnit {
    match unit {
        TimeUnit::Nanoseconds => scalar::TimeUnit::Nanoseconds,
        TimeUnit::Microseconds => scalar::TimeUnit::Microseconds,
        TimeUnit::Milliseconds => scalar::TimeUnit::Milliseconds,
    }
}

pub fn display_type_of(dtype: &DataType) -> ColumnDisplayType {
    match dtype {
        DataType::Boolean => ColumnDisplayType::Boolean,
        dt if is_numeric(dt) => ColumnDisplayType::Number,
        DataType::String => ColumnDisplayType::String,
        DataType::Date => ColumnDisplayType::Date,
        DataType::Datetime(_, _) => ColumnDisplayType::Datetime,
        DataType::Time => ColumnDisplayType::Time,
        DataType::Duration(_) => ColumnDisplayType::Interval,
        DataType::List(_) => ColumnDisplayType::Array,
        DataType::Binary => ColumnDisplayType::Object,
        _ => ColumnDisplayType::Unknown,
    }
}

/// Converts a polars series to neutral cells.
pub fn series_to_scalars(series: &Series) -> BackendResult<Vec<Scalar>> {
    let cells = match series.dtype() {
        DataType::Boolean => series
            .bool()?
            .iter()
            .map(|v| v.map(Scalar::Bool).unwrap_or(Scalar::Null))
            .collect(),
        dt if dt.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .iter()
            .map(|v| v.map(Scalar::Int).unwrap_or(Scalar::Null))
            .collect(),
        dt if dt.is_float() => series
            .cast(&DataType::Float64)?
            .f64()?
            .iter()
            .map(|v| v.map(Scalar::Float).unwrap_or(Scalar::Null))
            .collect(),
        DataType::String => series
            .str()?
            .iter()
            .map(|v| v.map(|s| Scalar::Str(s.to_string())).unwrap_or(Scalar::Null))
            .collect(),
        DataType::Date => series
            .cast(&DataType::Int32)?
            .i32()?
            .iter()
            .map(|v| {
                v.and_then(|d| Scalar::date_from_epoch_days(d as i64))
                    .map(Scalar::Date)
                    .unwrap_or(Scalar::Null)
            })
            .collect(),
        DataType::Datetime(unit, tz) => {
            let unit = cell_unit(unit);
            let tz = tz.as_ref().map(|z| z.to_string());
            series
                .cast(&DataType::Int64)?
                .i64()?
                .iter()
                .map(|v| {
                    v.and_then(|e| Scalar::datetime_from_epoch(e, unit))
                        .map(|ts| Scalar::Datetime {
                            ts,
                            unit,
                            tz: tz.clone(),
                        })
                        .unwrap_or(Scalar::Null)
                })
                .collect()
        }
        DataType::Time => series
            .cast(&DataType::Int64)?
            .i64()?
            .iter()
            .map(|v| {
                v.and_then(Scalar::time_from_nanos)
                    .map(Scalar::Time)
                    .unwrap_or(Scalar::Null)
            })
            .collect(),
        _ => {
            let mut cells = Vec::with_capacity(series.len());
            for i in 0..series.len() {
                let av = series.get(i)?;
                cells.push(if av.is_null() {
                    Scalar::Null
                } else {
                    Scalar::Other(av.to_string())
                });
            }
            cells
        }
    };
    Ok(cells)
}

/// Present values of a numeric series as f64, NaN included.
fn float_values(series: &Series) -> BackendResult<Vec<Option<f64>>> {
    Ok(series.cast(&DataType::Float64)?.f64()?.iter().collect())
}

/// Dtypes polars can order and group without going through `Scalar`.
fn is_native_sortable(dtype: &DataType) -> bool {
    is_numeric(dtype)
        || matches!(
            dtype,
            DataType::Boolean
                | DataType::String
                | DataType::Date
                | DataType::Datetime(_, _)
                | DataType::Time
                | DataType::Duration(_)
        )
}

/// Float series with NaN replaced by null, so NaN orders and aggregates
/// like a missing value. Other dtypes come back unchanged.
fn nan_as_null(series: Series) -> BackendResult<Series> {
    if !series.dtype().is_float() {
        return Ok(series);
    }
    let values: Vec<Option<f64>> = float_values(&series)?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Ok(Series::new(series.name().clone(), values))
}

impl TableBackend for PolarsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Polars
    }

    fn num_rows(&self) -> usize {
        self.df.height()
    }

    fn num_columns(&self) -> usize {
        self.df.width()
    }

    fn column_name(&self, column: usize) -> BackendResult<String> {
        Ok(self.series(column)?.name().to_string())
    }

    fn column_type_name(&self, column: usize) -> BackendResult<String> {
        Ok(self.series(column)?.dtype().to_string())
    }

    fn column_type_display(&self, column: usize) -> BackendResult<ColumnDisplayType> {
        Ok(display_type_of(self.series(column)?.dtype()))
    }

    fn column_timezone(&self, column: usize) -> BackendResult<Option<String>> {
        Ok(match self.series(column)?.dtype() {
            DataType::Datetime(_, Some(tz)) => Some(tz.to_string()),
            _ => None,
        })
    }

    fn gather(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<Vec<Scalar>> {
        series_to_scalars(&self.subset(column, rows)?)
    }

    fn filter_mask(
        &self,
        column: usize,
        kind: &RowFilterKind,
        display: ColumnDisplayType,
    ) -> BackendResult<Vec<Option<bool>>> {
        let series = self.series(column)?;
        match kind {
            RowFilterKind::IsNull => Ok(series.is_null().iter().collect()),
            RowFilterKind::NotNull => Ok(series.is_not_null().iter().collect()),
            RowFilterKind::Compare(params) if is_numeric(series.dtype()) => {
                let target = numeric_param(&params.value, display)?;
                Ok(float_values(series)?
                    .into_iter()
                    .map(|v| {
                        let v = v.filter(|x| !x.is_nan())?;
                        v.partial_cmp(&target).map(|ord| params.op.holds(ord))
                    })
                    .collect())
            }
            RowFilterKind::Between(params) | RowFilterKind::NotBetween(params)
                if is_numeric(series.dtype()) =>
            {
                let left = numeric_param(&params.left_value, display)?;
                let right = numeric_param(&params.right_value, display)?;
                let negate = matches!(kind, RowFilterKind::NotBetween(_));
                Ok(float_values(series)?
                    .into_iter()
                    .map(|v| {
                        let v = v.filter(|x| !x.is_nan())?;
                        Some((left <= v && v <= right) != negate)
                    })
                    .collect())
            }
            _ => predicate::evaluate(&series_to_scalars(series)?, kind, display),
        }
    }

    fn argsort(
        &self,
        column: usize,
        rows: Option<&[usize]>,
        ascending: bool,
    ) -> BackendResult<Vec<usize>> {
        let series = self.subset(column, rows)?;
        if !is_native_sortable(series.dtype()) {
            return Ok(stable_argsort(&series_to_scalars(&series)?, rows, ascending));
        }
        let order = nan_as_null(series)?.arg_sort(SortOptions {
            descending: !ascending,
            nulls_last: true,
            maintain_order: true,
            ..Default::default()
        });
        Ok(order
            .iter()
            .flatten()
            .map(|i| match rows {
                Some(rows) => rows[i as usize],
                None => i as usize,
            })
            .collect())
    }

    fn null_count(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<u64> {
        Ok(self.subset(column, rows)?.null_count() as u64)
    }

    fn numeric_summary(
        &self,
        column: usize,
        rows: Option<&[usize]>,
    ) -> BackendResult<NumericSummary> {
        let series = self.subset(column, rows)?;
        if !is_numeric(series.dtype()) {
            return summarize_numeric(&series_to_scalars(&series)?);
        }
        let is_integer = series.dtype().is_integer();
        let series = nan_as_null(series)?.cast(&DataType::Float64)?;
        let count = series.len() - series.null_count();
        if count == 0 {
            return Ok(NumericSummary {
                is_integer,
                ..NumericSummary::default()
            });
        }
        let has_infinite = series.f64()?.into_iter().flatten().any(f64::is_infinite);
        let (mean, median, stdev) = if has_infinite {
            (None, None, None)
        } else {
            let stdev = if count > 1 { series.std(1) } else { None };
            (series.mean(), series.median(), stdev)
        };
        Ok(NumericSummary {
            count,
            min: series.min::<f64>()?,
            max: series.max::<f64>()?,
            mean,
            median,
            stdev,
            has_infinite,
            is_integer,
        })
    }

    fn value_counts(
        &self,
        column: usize,
        rows: Option<&[usize]>,
    ) -> BackendResult<Vec<(Scalar, u64)>> {
        let mut series = self.subset(column, rows)?;
        if !is_native_sortable(series.dtype()) {
            return Ok(count_values(series_to_scalars(&series)?));
        }
        series.rename("value".into());
        // Stable grouping keeps first-appearance order, and the sort keeps
        // it among equal counts.
        let counted = series
            .into_frame()
            .lazy()
            .filter(col("value").is_not_null())
            .group_by_stable([col("value")])
            .agg([len().alias("count")])
            .sort_by_exprs(
                vec![col("count")],
                SortMultipleOptions {
                    descending: vec![true],
                    maintain_order: true,
                    ..Default::default()
                },
            )
            .collect()?;
        let values = series_to_scalars(counted.column("value")?.as_materialized_series())?;
        let counts = counted
            .column("count")?
            .as_materialized_series()
            .cast(&DataType::UInt64)?;
        Ok(values
            .into_iter()
            .zip(counts.u64()?.into_iter())
            .map(|(value, count)| (value, count.unwrap_or(0)))
            .collect())
    }

    fn count_distinct(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<u64> {
        let series = self.subset(column, rows)?;
        let unique = series.n_unique()?;
        let with_null = usize::from(series.null_count() > 0);
        Ok(unique.saturating_sub(with_null) as u64)
    }
}

fn numeric_param(value: &str, display: ColumnDisplayType) -> BackendResult<f64> {
    predicate::parse_filter_value(value, display)?
        .as_f64()
        .ok_or_else(|| BackendError::evaluation(format!("'{}' is not a number", value)))
}
