//! Histogram binning.

use crate::backend::TableBackend;
use crate::comm::{
    ColumnDisplayType, ColumnHistogram, ColumnHistogramMethod, ColumnHistogramParams,
    ColumnQuantileValue, ColumnSchema, FormatOptions,
};
use crate::error::{BackendError, BackendResult};
use crate::format::format_float;
use crate::scalar::{format_datetime, Scalar, TimeUnit};
use crate::statistics::{iqr_sorted, quantile_sorted, sample_std};

/// Bin edges (one more than counts) and per-bin counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

/// Number of bins `method` picks for sorted finite values, capped at
/// `max_bins` and, for integer data, at the number of distinct integers the
/// range can hold.
pub fn choose_bin_count(
    sorted: &[f64],
    method: ColumnHistogramMethod,
    max_bins: usize,
    is_integer: bool,
) -> usize {
    let max_bins = max_bins.max(1);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return 0;
    };
    let n = sorted.len() as f64;
    let range = max - min;
    let sqrt_width = range / n.sqrt();
    let bins_for_width = |width: f64| -> usize {
        let width = if width > 0.0 && width.is_finite() {
            width
        } else {
            sqrt_width
        };
        (range / width).ceil() as usize
    };

    let bins = match method {
        ColumnHistogramMethod::Fixed => max_bins,
        ColumnHistogramMethod::Sturges => (n.log2().ceil() + 1.0) as usize,
        ColumnHistogramMethod::FreedmanDiaconis => {
            let iqr = iqr_sorted(sorted).unwrap_or(0.0);
            bins_for_width(2.0 * iqr * n.powf(-1.0 / 3.0))
        }
        ColumnHistogramMethod::Scott => {
            let std = sample_std(sorted).unwrap_or(0.0);
            bins_for_width(3.5 * std * n.powf(-1.0 / 3.0))
        }
    };

    let mut bins = bins.clamp(1, max_bins);
    // Compare in f64: a range near the i64 extremes does not fit a usize.
    if is_integer && range < bins as f64 {
        bins = range as usize + 1;
    }
    bins
}

/// Bin `values`, ignoring non-finite entries.
pub fn bin_values(
    values: Vec<f64>,
    method: ColumnHistogramMethod,
    max_bins: usize,
    is_integer: bool,
) -> Bins {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Bins {
            edges: vec![0.0, 1.0],
            counts: Vec::new(),
        };
    };
    if min == max {
        return Bins {
            edges: vec![min, max],
            counts: vec![sorted.len() as u64],
        };
    }

    let bins = choose_bin_count(&sorted, method, max_bins, is_integer);
    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| if i == bins { max } else { min + width * i as f64 })
        .collect();
    let mut counts = vec![0u64; bins];
    for v in &sorted {
        // Last bin is closed on the right.
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Bins { edges, counts }
}

/// How histogram inputs map to f64 and back to display strings.
#[derive(Debug, Clone, Copy)]
enum Domain {
    Number,
    Date,
    Datetime(TimeUnit),
}

impl Domain {
    fn render(self, value: f64, opts: &FormatOptions) -> String {
        match self {
            Domain::Number => format_float(value, opts),
            Domain::Date => Scalar::date_from_epoch_days(value.floor() as i64)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| format_float(value, opts)),
            Domain::Datetime(unit) => Scalar::datetime_from_epoch(value.round() as i64, unit)
                .map(|ts| format_datetime(&ts, unit))
                .unwrap_or_else(|| format_float(value, opts)),
        }
    }
}

pub fn compute_histogram(
    backend: &dyn TableBackend,
    schema: &ColumnSchema,
    rows: Option<&[usize]>,
    params: &ColumnHistogramParams,
    opts: &FormatOptions,
) -> BackendResult<ColumnHistogram> {
    let cells = backend.gather(schema.column_index, rows)?;
    let mut domain = match schema.type_display {
        ColumnDisplayType::Number => Domain::Number,
        ColumnDisplayType::Date => Domain::Date,
        ColumnDisplayType::Datetime => Domain::Datetime(TimeUnit::Microseconds),
        other => {
            return Err(BackendError::evaluation(format!(
                "histograms are not available for {:?} columns",
                other
            )))
        }
    };
    let mut is_integer = !matches!(domain, Domain::Datetime(_));
    let mut values = Vec::with_capacity(cells.len());
    for cell in &cells {
        match cell {
            Scalar::Null => continue,
            Scalar::Float(_) => is_integer = false,
            Scalar::Datetime { unit, .. } => domain = Domain::Datetime(*unit),
            _ => {}
        }
        if let Some(v) = cell.as_f64() {
            values.push(v);
        }
    }

    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    let bins = bin_values(values, params.method, params.num_bins, is_integer);

    let render_edge = |v: f64| {
        if bins.counts.is_empty() {
            format_float(v, opts)
        } else {
            domain.render(v, opts)
        }
    };
    let quantiles = params
        .quantiles
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|&q| {
            quantile_sorted(&finite, q).map(|value| ColumnQuantileValue {
                q,
                value: domain.render(value, opts),
                exact: true,
            })
        })
        .collect();

    Ok(ColumnHistogram {
        bin_edges: bins.edges.iter().map(|&e| render_edge(e)).collect(),
        bin_counts: bins.counts,
        quantiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PolarsBackend;
    use polars::prelude::{DataType, NamedFrom, Series};

    fn one_to(n: i64) -> Vec<f64> {
        (1..=n).map(|v| v as f64).collect()
    }

    #[test]
    fn empty_input_gives_sentinel() {
        let bins = bin_values(vec![f64::NAN, f64::INFINITY], ColumnHistogramMethod::Sturges, 10, false);
        assert_eq!(bins.edges, vec![0.0, 1.0]);
        assert!(bins.counts.is_empty());
    }

    #[test]
    fn single_value_gives_one_zero_width_bin() {
        let bins = bin_values(vec![4.0; 7], ColumnHistogramMethod::FreedmanDiaconis, 10, false);
        assert_eq!(bins.edges, vec![4.0, 4.0]);
        assert_eq!(bins.counts, vec![7]);
    }

    #[test]
    fn method_bin_counts() {
        let v = one_to(100);
        assert_eq!(choose_bin_count(&v, ColumnHistogramMethod::Sturges, 20, false), 8);
        assert_eq!(choose_bin_count(&v, ColumnHistogramMethod::FreedmanDiaconis, 20, false), 5);
        assert_eq!(choose_bin_count(&v, ColumnHistogramMethod::Scott, 20, false), 5);
        assert_eq!(choose_bin_count(&v, ColumnHistogramMethod::Fixed, 20, false), 20);
        assert_eq!(choose_bin_count(&v, ColumnHistogramMethod::Sturges, 3, false), 3);
    }

    #[test]
    fn zero_iqr_falls_back_to_sqrt_rule() {
        let mut v: Vec<f64> = vec![5.0; 14];
        v.push(0.0);
        v.push(10.0);
        v.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            choose_bin_count(&v, ColumnHistogramMethod::FreedmanDiaconis, 100, false),
            4
        );
    }

    #[test]
    fn integer_columns_never_exceed_distinct_values() {
        let bins = bin_values(one_to(3), ColumnHistogramMethod::Fixed, 10, true);
        assert_eq!(bins.counts.len(), 3);
        assert_eq!(bins.counts.iter().sum::<u64>(), 3);
        assert_eq!(bins.edges.len(), 4);
    }


    fn schema(display: ColumnDisplayType) -> ColumnSchema {
        ColumnSchema {
            column_index: 0,
            column_name: "v".to_string(),
            type_name: String::new(),
            type_display: display,
            timezone: None,
        }
    }

    fn histogram_of(series: Series, display: ColumnDisplayType, num_bins: usize) -> ColumnHistogram {
        let backend = PolarsBackend::new(series.into_frame());
        let params = ColumnHistogramParams {
            method: ColumnHistogramMethod::Fixed,
            num_bins,
            quantiles: Some(vec![0.5]),
        };
        compute_histogram(&backend, &schema(display), None, &params, &FormatOptions::default())
            .unwrap()
    }

    #[test]
    fn number_histogram_renders_edges_and_quantiles() {
        let hist = histogram_of(
            Series::new("v".into(), &[Some(1i64), Some(2), None, Some(3), Some(4)]),
            ColumnDisplayType::Number,
            2,
        );
        assert_eq!(hist.bin_edges, vec!["1.00", "2.50", "4.00"]);
        assert_eq!(hist.bin_counts, vec![2, 2]);
        assert_eq!(hist.quantiles.len(), 1);
        assert_eq!(hist.quantiles[0].value, "2.50");
        assert!(hist.quantiles[0].exact);
    }

    #[test]
    fn repeated_value_gives_one_bin() {
        let hist = histogram_of(Series::new("v".into(), &[5i64, 5, 5]), ColumnDisplayType::Number, 10);
        assert_eq!(hist.bin_edges, vec!["5.00", "5.00"]);
        assert_eq!(hist.bin_counts, vec![3]);
    }

    #[test]
    fn all_null_column_gives_sentinel_edges() {
        let hist = histogram_of(
            Series::new("v".into(), &[None::<i64>, None]),
            ColumnDisplayType::Number,
            10,
        );
        assert_eq!(hist.bin_edges, vec!["0.00", "1.00"]);
        assert!(hist.bin_counts.is_empty());
        assert!(hist.quantiles.is_empty());
    }

    #[test]
    fn extreme_integer_range_keeps_requested_bins() {
        let hist = histogram_of(
            Series::new("v".into(), &[i64::MIN, i64::MAX]),
            ColumnDisplayType::Number,
            10,
        );
        assert_eq!(hist.bin_counts.len(), 10);
        assert_eq!(hist.bin_edges.len(), 11);
        assert_eq!(hist.bin_counts.iter().sum::<u64>(), 2);
        assert_eq!(hist.bin_counts[0], 1);
        assert_eq!(hist.bin_counts[9], 1);
    }

    #[test]
    fn date_histogram_renders_dates() {
        // 2024-01-01 and 2024-01-03 as days since the epoch.
        let dates = Series::new("v".into(), &[19723i32, 19725])
            .cast(&DataType::Date)
            .unwrap();
        let hist = histogram_of(dates, ColumnDisplayType::Date, 2);
        assert_eq!(hist.bin_edges, vec!["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(hist.bin_counts, vec![1, 1]);
        assert_eq!(hist.quantiles[0].value, "2024-01-02");
    }

    #[test]
    fn string_columns_have_no_histogram() {
        let backend = PolarsBackend::new(Series::new("v".into(), &["a", "b"]).into_frame());
        let params = ColumnHistogramParams {
            method: ColumnHistogramMethod::Sturges,
            num_bins: 10,
            quantiles: None,
        };
        let err = compute_histogram(
            &backend,
            &schema(ColumnDisplayType::String),
            None,
            &params,
            &FormatOptions::default(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn integer_cap_handles_full_i64_range() {
        let sorted = vec![i64::MIN as f64, i64::MAX as f64];
        assert_eq!(choose_bin_count(&sorted, ColumnHistogramMethod::Fixed, 10, true), 10);
    }

    #[test]
    fn max_value_lands_in_last_bin() {
        let bins = bin_values(vec![0.0, 1.0, 2.0, 10.0], ColumnHistogramMethod::Fixed, 2, false);
        assert_eq!(bins.edges, vec![0.0, 5.0, 10.0]);
        assert_eq!(bins.counts, vec![3, 1]);
    }
}
