//! Column profiles: null counts, summary statistics, histograms and
//! frequency tables over the filtered rows of one column.

pub mod freqtable;
pub mod histogram;
pub mod summary;

use std::any::Any;
use std::panic;

use tracing::{debug, warn};

use crate::backend::TableBackend;
use crate::comm::{
    ColumnHistogramMethod, ColumnHistogramParams, ColumnProfileParams, ColumnProfileResult,
    ColumnProfileSpec, ColumnProfileType, ColumnSchema, FormatOptions,
};
use crate::error::{BackendError, BackendResult};
use crate::features::profile_supported;

pub use self::freqtable::compute_frequency_table;
pub use self::histogram::compute_histogram;
pub use self::summary::summary_stats;

/// Parameters used when a profile spec carries none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDefaults {
    pub histogram_method: ColumnHistogramMethod,
    pub small_histogram_bins: usize,
    pub large_histogram_bins: usize,
    pub small_frequency_limit: usize,
    pub large_frequency_limit: usize,
}

impl Default for ProfileDefaults {
    fn default() -> Self {
        Self {
            histogram_method: ColumnHistogramMethod::FreedmanDiaconis,
            small_histogram_bins: 20,
            large_histogram_bins: 80,
            small_frequency_limit: 5,
            large_frequency_limit: 10,
        }
    }
}

impl ProfileDefaults {
    fn histogram_params(&self, spec: &ColumnProfileSpec) -> ColumnHistogramParams {
        if let Some(ColumnProfileParams::Histogram(p)) = &spec.params {
            return p.clone();
        }
        let num_bins = match spec.profile_type {
            ColumnProfileType::LargeHistogram => self.large_histogram_bins,
            _ => self.small_histogram_bins,
        };
        ColumnHistogramParams {
            method: self.histogram_method,
            num_bins,
            quantiles: None,
        }
    }

    fn frequency_limit(&self, spec: &ColumnProfileSpec) -> usize {
        if let Some(ColumnProfileParams::FrequencyTable(p)) = &spec.params {
            return p.limit;
        }
        match spec.profile_type {
            ColumnProfileType::LargeFrequencyTable => self.large_frequency_limit,
            _ => self.small_frequency_limit,
        }
    }
}

/// Compute every spec for one column. A spec that fails leaves its field
/// empty and the remaining specs still run.
pub fn compute_column_profile(
    backend: &dyn TableBackend,
    schema: &ColumnSchema,
    rows: Option<&[usize]>,
    specs: &[ColumnProfileSpec],
    opts: &FormatOptions,
    defaults: &ProfileDefaults,
) -> ColumnProfileResult {
    let mut result = ColumnProfileResult::default();
    for spec in specs {
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            compute_one(backend, schema, rows, spec, opts, defaults, &mut result)
        }));
        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(
            column = %schema.column_name,
            profile = ?spec.profile_type,
            error = %message,
            "column profile failed"
        );
    }
    result
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn compute_one(
    backend: &dyn TableBackend,
    schema: &ColumnSchema,
    rows: Option<&[usize]>,
    spec: &ColumnProfileSpec,
    opts: &FormatOptions,
    defaults: &ProfileDefaults,
    result: &mut ColumnProfileResult,
) -> BackendResult<()> {
    if !profile_supported(spec.profile_type, schema.type_display) {
        debug!(
            column = %schema.column_name,
            profile = ?spec.profile_type,
            "profile not supported for column type"
        );
        return Err(BackendError::evaluation(format!(
            "{:?} is not available for {:?} columns",
            spec.profile_type, schema.type_display
        )));
    }
    match spec.profile_type {
        ColumnProfileType::NullCount => {
            result.null_count = Some(backend.null_count(schema.column_index, rows)?);
        }
        ColumnProfileType::SummaryStats => {
            result.summary_stats = Some(summary_stats(backend, schema, rows, opts)?);
        }
        ColumnProfileType::SmallHistogram => {
            let params = defaults.histogram_params(spec);
            result.small_histogram = Some(compute_histogram(backend, schema, rows, &params, opts)?);
        }
        ColumnProfileType::LargeHistogram => {
            let params = defaults.histogram_params(spec);
            result.large_histogram = Some(compute_histogram(backend, schema, rows, &params, opts)?);
        }
        ColumnProfileType::SmallFrequencyTable => {
            let limit = defaults.frequency_limit(spec);
            result.small_frequency_table =
                Some(compute_frequency_table(backend, schema, rows, limit, opts)?);
        }
        ColumnProfileType::LargeFrequencyTable => {
            let limit = defaults.frequency_limit(spec);
            result.large_frequency_table =
                Some(compute_frequency_table(backend, schema, rows, limit, opts)?);
        }
    }
    Ok(())
}
