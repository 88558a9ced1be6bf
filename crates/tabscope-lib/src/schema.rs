//! Column schema provider.
//!
//! Schemas are served from a whole-table cache when the table is small enough
//! to inspect eagerly, and computed per column (then memoized) otherwise.

use regex::RegexBuilder;
use tracing::debug;

use crate::backend::predicate::text_matches;
use crate::backend::TableBackend;
use crate::comm::{
    ColumnDisplayType, ColumnFilter, ColumnSchema, SearchSchemaSortOrder, TextSearchType,
};
use crate::error::{BackendResult, ExplorerError, ExplorerResult};
use crate::state::DataExplorerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaCacheLimits {
    pub max_cached_columns: usize,
    pub max_cached_cells: usize,
}

impl Default for SchemaCacheLimits {
    fn default() -> Self {
        Self {
            max_cached_columns: 1000,
            max_cached_cells: 10_000_000,
        }
    }
}

pub fn should_cache_schema(num_rows: usize, num_columns: usize, limits: &SchemaCacheLimits) -> bool {
    num_columns <= limits.max_cached_columns
        && num_rows.saturating_mul(num_columns) <= limits.max_cached_cells
}

/// Display type for a value-type tag produced by backend inference.
pub fn display_for_inferred(tag: &str) -> ColumnDisplayType {
    match tag {
        "integer" | "floating" => ColumnDisplayType::Number,
        "boolean" => ColumnDisplayType::Boolean,
        "string" => ColumnDisplayType::String,
        "date" => ColumnDisplayType::Date,
        "datetime" => ColumnDisplayType::Datetime,
        "time" => ColumnDisplayType::Time,
        "empty" => ColumnDisplayType::Unknown,
        _ => ColumnDisplayType::Object,
    }
}

/// Reads a column's schema from the backend, consulting and filling the
/// inferred type cache for dynamically typed columns.
fn inspect_column(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
    column: usize,
) -> BackendResult<ColumnSchema> {
    let mut type_display = backend.column_type_display(column)?;
    if type_display == ColumnDisplayType::Object {
        let inferred = match state.inferred_dtype_cache.get(&column) {
            Some(tag) => Some(tag.clone()),
            None => {
                let tag = backend.infer_column_type(column)?;
                if let Some(tag) = &tag {
                    state.inferred_dtype_cache.insert(column, tag.clone());
                }
                tag
            }
        };
        if let Some(tag) = inferred {
            type_display = display_for_inferred(&tag);
        }
    }
    Ok(ColumnSchema {
        column_index: column,
        column_name: backend.column_name(column)?,
        type_name: backend.column_type_name(column)?,
        type_display,
        timezone: backend.column_timezone(column)?,
    })
}

/// Schema of one column, from cache when available.
pub fn column_schema(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
    column: usize,
) -> BackendResult<ColumnSchema> {
    if let Some(schema) = state.schema_cache.as_ref().and_then(|c| c.get(column)) {
        return Ok(schema.clone());
    }
    if let Some(schema) = state.schema_memo.get(&column) {
        return Ok(schema.clone());
    }
    let schema = inspect_column(backend, state, column)?;
    state.schema_memo.insert(column, schema.clone());
    Ok(schema)
}

/// Schemas for every column, ignoring caches.
pub fn inspect_all(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
) -> BackendResult<Vec<ColumnSchema>> {
    (0..backend.num_columns())
        .map(|i| inspect_column(backend, state, i))
        .collect()
}

/// Fills the whole-table cache if the table is under the limits. Returns
/// whether the cache was populated. Re-run on every table replacement.
pub fn prepare_schema_cache(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
    limits: &SchemaCacheLimits,
) -> BackendResult<bool> {
    let (rows, cols) = (backend.num_rows(), backend.num_columns());
    if !should_cache_schema(rows, cols, limits) {
        debug!(rows, cols, "schema too large to cache eagerly");
        state.schema_cache = None;
        return Ok(false);
    }
    let schema = inspect_all(backend, state)?;
    debug!(cols, "cached full table schema");
    state.schema_cache = Some(schema);
    Ok(true)
}

/// Schemas for `indices`. Indices past the last column are dropped; negative
/// indices are an error.
pub fn get_schema(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
    indices: &[i64],
) -> ExplorerResult<Vec<ColumnSchema>> {
    if let Some(bad) = indices.iter().find(|&&i| i < 0) {
        return Err(ExplorerError::IndexError(format!(
            "column index {} is negative",
            bad
        )));
    }
    let num_columns = backend.num_columns();
    let mut out = Vec::with_capacity(indices.len());
    for &i in indices {
        let i = i as usize;
        if i >= num_columns {
            continue;
        }
        out.push(column_schema(backend, state, i)?);
    }
    Ok(out)
}

enum NameMatcher {
    Plain {
        search_type: TextSearchType,
        term: String,
        case_sensitive: bool,
    },
    Regex(regex::Regex),
}

impl NameMatcher {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Regex(re) => re.is_match(name),
            NameMatcher::Plain {
                search_type,
                term,
                case_sensitive,
            } => {
                if *case_sensitive {
                    text_matches(*search_type, name, term)
                } else {
                    text_matches(*search_type, &name.to_lowercase(), term)
                }
            }
        }
    }
}

/// Column indices whose schema passes every filter, in `sort_order`.
pub fn search_schema(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
    filters: &[ColumnFilter],
    sort_order: SearchSchemaSortOrder,
) -> ExplorerResult<Vec<usize>> {
    let mut name_matchers = Vec::new();
    let mut type_sets = Vec::new();
    for filter in filters {
        match filter {
            ColumnFilter::TextSearch(p) if p.search_type == TextSearchType::RegexMatch => {
                let re = RegexBuilder::new(&p.term)
                    .case_insensitive(!p.case_sensitive)
                    .build()
                    .map_err(|e| ExplorerError::InvalidRequest(format!("invalid pattern: {}", e)))?;
                name_matchers.push(NameMatcher::Regex(re));
            }
            ColumnFilter::TextSearch(p) => name_matchers.push(NameMatcher::Plain {
                search_type: p.search_type,
                term: if p.case_sensitive {
                    p.term.clone()
                } else {
                    p.term.to_lowercase()
                },
                case_sensitive: p.case_sensitive,
            }),
            ColumnFilter::MatchDataTypes(p) => type_sets.push(p.display_types.clone()),
        }
    }

    let mut matches: Vec<(usize, String)> = Vec::new();
    for i in 0..backend.num_columns() {
        let schema = column_schema(backend, state, i)?;
        let name_ok = name_matchers.iter().all(|m| m.matches(&schema.column_name));
        let type_ok = type_sets
            .iter()
            .all(|set| set.contains(&schema.type_display));
        if name_ok && type_ok {
            matches.push((i, schema.column_name));
        }
    }

    match sort_order {
        SearchSchemaSortOrder::Original => {}
        SearchSchemaSortOrder::AscendingName => {
            matches.sort_by(|a, b| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
        }
        SearchSchemaSortOrder::DescendingName => {
            matches.sort_by(|a, b| b.1.to_lowercase().cmp(&a.1.to_lowercase()))
        }
    }
    Ok(matches.into_iter().map(|(i, _)| i).collect())
}
