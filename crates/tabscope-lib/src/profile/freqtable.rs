//! Top-K frequency tables.

use crate::backend::TableBackend;
use crate::comm::{ColumnFrequencyTable, ColumnSchema, FormatOptions};
use crate::error::BackendResult;
use crate::format::format_value;

pub fn compute_frequency_table(
    backend: &dyn TableBackend,
    schema: &ColumnSchema,
    rows: Option<&[usize]>,
    limit: usize,
    opts: &FormatOptions,
) -> BackendResult<ColumnFrequencyTable> {
    let counts = backend.value_counts(schema.column_index, rows)?;
    let split = limit.min(counts.len());
    let (top, rest) = counts.split_at(split);
    Ok(ColumnFrequencyTable {
        values: top.iter().map(|(v, _)| format_value(v, opts)).collect(),
        counts: top.iter().map(|(_, c)| *c).collect(),
        other_count: rest.iter().map(|(_, c)| *c).sum(),
    })
}
