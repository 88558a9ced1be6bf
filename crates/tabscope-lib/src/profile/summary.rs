//! Type-specific summary statistics.

use chrono::{NaiveDate, NaiveDateTime};

use crate::backend::TableBackend;
use crate::comm::{
    ColumnDisplayType, ColumnSchema, ColumnSummaryStats, FormatOptions, SummaryStatsBoolean,
    SummaryStatsDate, SummaryStatsDatetime, SummaryStatsNumber, SummaryStatsOther,
    SummaryStatsString,
};
use crate::error::BackendResult;
use crate::format::{format_float, format_int, format_scalar_text};
use crate::scalar::{datetime_to_epoch, format_datetime, Scalar, TimeUnit};
use crate::statistics::{mean, quantile_sorted};

pub fn summary_stats(
    backend: &dyn TableBackend,
    schema: &ColumnSchema,
    rows: Option<&[usize]>,
    opts: &FormatOptions,
) -> BackendResult<ColumnSummaryStats> {
    let column = schema.column_index;
    let mut stats = ColumnSummaryStats::empty(schema.type_display);
    match schema.type_display {
        ColumnDisplayType::Number => {
            stats.number_stats = Some(number_stats(backend, column, rows, opts)?);
        }
        ColumnDisplayType::String => {
            let cells = backend.gather(column, rows)?;
            let num_empty = cells
                .iter()
                .filter(|c| matches!(c, Scalar::Str(s) if s.is_empty()))
                .count() as u64;
            stats.string_stats = Some(SummaryStatsString {
                num_empty,
                num_unique: backend.count_distinct(column, rows)?,
            });
        }
        ColumnDisplayType::Boolean => {
            let cells = backend.gather(column, rows)?;
            let true_count = cells.iter().filter(|c| **c == Scalar::Bool(true)).count() as u64;
            let false_count = cells.iter().filter(|c| **c == Scalar::Bool(false)).count() as u64;
            stats.boolean_stats = Some(SummaryStatsBoolean {
                true_count,
                false_count,
            });
        }
        ColumnDisplayType::Date => {
            let cells = backend.gather(column, rows)?;
            let mut stats_date = date_stats(&cells);
            stats_date.num_unique = Some(backend.count_distinct(column, rows)?);
            stats.date_stats = Some(stats_date);
        }
        ColumnDisplayType::Datetime => {
            let cells = backend.gather(column, rows)?;
            let mut stats_dt = datetime_stats(&cells, schema.timezone.as_deref());
            stats_dt.num_unique = Some(backend.count_distinct(column, rows)?);
            stats.datetime_stats = Some(stats_dt);
        }
        _ => {
            stats.other_stats = Some(SummaryStatsOther {
                num_unique: backend.count_distinct(column, rows).ok(),
            });
        }
    }
    Ok(stats)
}

fn number_stats(
    backend: &dyn TableBackend,
    column: usize,
    rows: Option<&[usize]>,
    opts: &FormatOptions,
) -> BackendResult<SummaryStatsNumber> {
    let summary = backend.numeric_summary(column, rows)?;
    let bound = |v: Option<f64>| {
        v.map(|v| {
            if summary.is_integer && v.is_finite() {
                format_int(v as i64, opts)
            } else {
                format_scalar_text(&Scalar::Float(v), opts)
            }
        })
    };
    Ok(SummaryStatsNumber {
        min_value: bound(summary.min),
        max_value: bound(summary.max),
        mean: summary.mean.map(|v| format_float(v, opts)),
        median: summary.median.map(|v| format_float(v, opts)),
        stdev: summary.stdev.map(|v| format_float(v, opts)),
    })
}

/// Dates as whole days; a mean or median between two days shows its time.
fn render_epoch_days(days: f64) -> Option<String> {
    let whole = days.floor();
    let date = Scalar::date_from_epoch_days(whole as i64)?;
    let secs = ((days - whole) * 86_400.0).round() as u32;
    if secs == 0 {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    let ts = date.and_hms_opt(0, 0, 0)? + chrono::Duration::seconds(secs as i64);
    Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn date_stats(cells: &[Scalar]) -> SummaryStatsDate {
    let mut dates: Vec<NaiveDate> = cells
        .iter()
        .filter_map(|c| match c {
            Scalar::Date(d) => Some(*d),
            _ => None,
        })
        .collect();
    if dates.is_empty() {
        return SummaryStatsDate::default();
    }
    dates.sort();
    let days: Vec<f64> = dates
        .iter()
        .filter_map(|d| Scalar::Date(*d).as_f64())
        .collect();
    SummaryStatsDate {
        num_unique: None,
        min_date: dates.first().map(|d| d.format("%Y-%m-%d").to_string()),
        mean_date: render_epoch_days(mean(&days)),
        median_date: quantile_sorted(&days, 0.5).and_then(render_epoch_days),
        max_date: dates.last().map(|d| d.format("%Y-%m-%d").to_string()),
    }
}

fn datetime_stats(cells: &[Scalar], column_tz: Option<&str>) -> SummaryStatsDatetime {
    let mut stamps: Vec<(NaiveDateTime, TimeUnit)> = Vec::new();
    let mut zones: Vec<String> = Vec::new();
    for cell in cells {
        if let Scalar::Datetime { ts, unit, tz } = cell {
            stamps.push((*ts, *unit));
            if let Some(tz) = tz {
                if !zones.contains(tz) {
                    zones.push(tz.clone());
                }
            }
        }
    }
    if zones.is_empty() {
        if let Some(tz) = column_tz {
            zones.push(tz.to_string());
        }
    }
    let timezone = timezone_summary(&zones);
    if stamps.is_empty() {
        return SummaryStatsDatetime {
            timezone,
            ..SummaryStatsDatetime::default()
        };
    }

    // Render at the finest unit present.
    let unit = stamps
        .iter()
        .map(|(_, u)| *u)
        .max_by_key(|u| u.per_second())
        .unwrap_or(TimeUnit::Microseconds);
    stamps.sort_by_key(|(ts, _)| *ts);
    let epochs: Vec<f64> = stamps
        .iter()
        .map(|(ts, _)| datetime_to_epoch(ts, unit) as f64)
        .collect();
    let render = |v: f64| {
        Scalar::datetime_from_epoch(v.round() as i64, unit).map(|ts| format_datetime(&ts, unit))
    };
    SummaryStatsDatetime {
        num_unique: None,
        min_date: stamps.first().map(|(ts, _)| format_datetime(ts, unit)),
        mean_date: render(mean(&epochs)),
        median_date: quantile_sorted(&epochs, 0.5).and_then(render),
        max_date: stamps.last().map(|(ts, _)| format_datetime(ts, unit)),
        timezone,
    }
}

/// One zone name when homogeneous, otherwise the first two and a count.
pub fn timezone_summary(zones: &[String]) -> Option<String> {
    match zones {
        [] => None,
        [only] => Some(only.clone()),
        [a, b] => Some(format!("{}, {}", a, b)),
        [a, b, rest @ ..] => Some(format!("{}, {}, ... ({} more)", a, b, rest.len())),
    }
}
