//! Schema reconciliation after a table is replaced.
//!
//! Filters and sort keys follow their columns by name. A filter whose column
//! disappeared stays in place, marked invalid, so the client can show it as
//! broken; a sort key on a missing column is dropped.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::backend::TableBackend;
use crate::comm::ColumnSchema;
use crate::error::BackendResult;
use crate::features::{row_filter_supported, UNSUPPORTED_FILTER_MESSAGE};
use crate::filter::DELETED_COLUMN_MESSAGE;
use crate::schema::{column_schema, prepare_schema_cache, SchemaCacheLimits};
use crate::state::DataExplorerState;

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Whether clients must refetch the schema.
    pub schema_changed: bool,
    pub state: DataExplorerState,
}

/// Carry `old_state` over to `new_backend`. Never fails: if either table
/// cannot be inspected the view starts over with empty state.
pub fn reconcile(
    old_state: DataExplorerState,
    old_backend: &dyn TableBackend,
    new_backend: &dyn TableBackend,
    limits: &SchemaCacheLimits,
) -> Reconciliation {
    if old_backend.kind() != new_backend.kind() {
        info!(
            old = %old_backend.kind(),
            new = %new_backend.kind(),
            "table replaced by a different kind; resetting view state"
        );
        return fresh(new_backend, limits);
    }
    match try_reconcile(old_state, old_backend, new_backend, limits) {
        Ok(r) => r,
        Err(err) => {
            warn!(error = %err, "schema reconciliation failed; resetting view state");
            fresh(new_backend, limits)
        }
    }
}

fn fresh(new_backend: &dyn TableBackend, limits: &SchemaCacheLimits) -> Reconciliation {
    let mut state = DataExplorerState::new();
    if let Err(err) = prepare_schema_cache(new_backend, &mut state, limits) {
        warn!(error = %err, "could not inspect replacement table");
        state.clear_schema_caches();
    }
    Reconciliation {
        schema_changed: true,
        state,
    }
}

fn try_reconcile(
    old_state: DataExplorerState,
    old_backend: &dyn TableBackend,
    new_backend: &dyn TableBackend,
    limits: &SchemaCacheLimits,
) -> BackendResult<Reconciliation> {
    let old_schema = old_state.schema_cache.clone();
    let old_sort_names: Vec<Option<String>> = old_state
        .sort_keys
        .iter()
        .map(|k| old_column_name(old_schema.as_deref(), old_backend, k.column_index))
        .collect::<BackendResult<_>>()?;

    let mut state = DataExplorerState {
        row_filters: old_state.row_filters,
        sort_keys: Vec::new(),
        ..DataExplorerState::default()
    };
    let new_eager = prepare_schema_cache(new_backend, &mut state, limits)?;

    let schema_changed = match (&old_schema, &state.schema_cache) {
        (Some(old), Some(new)) if new_eager => schemas_differ(old, new),
        _ => {
            debug!("schema not cached on both sides; reporting a change");
            true
        }
    };

    let positions = name_positions(new_backend, state.schema_cache.as_deref())?;

    let mut filters = std::mem::take(&mut state.row_filters);
    for filter in filters.iter_mut() {
        match positions.get(filter.column_schema.column_name.as_str()) {
            Some(&index) => {
                let schema = column_schema(new_backend, &mut state, index)?;
                let supported = row_filter_supported(filter.filter_type(), schema.type_display);
                filter.column_schema = schema;
                if supported {
                    filter.mark_valid();
                } else {
                    filter.invalidate(UNSUPPORTED_FILTER_MESSAGE);
                }
            }
            None => filter.invalidate(DELETED_COLUMN_MESSAGE),
        }
    }
    state.row_filters = filters;

    state.sort_keys = old_state
        .sort_keys
        .iter()
        .zip(old_sort_names)
        .filter_map(|(key, name)| {
            let index = *positions.get(name?.as_str())?;
            let mut key = *key;
            key.column_index = index;
            Some(key)
        })
        .collect();

    debug!(
        schema_changed,
        filters = state.row_filters.len(),
        sort_keys = state.sort_keys.len(),
        "reconciled view state"
    );
    Ok(Reconciliation {
        schema_changed,
        state,
    })
}

fn old_column_name(
    cache: Option<&[ColumnSchema]>,
    backend: &dyn TableBackend,
    index: usize,
) -> BackendResult<Option<String>> {
    if let Some(schema) = cache.and_then(|c| c.get(index)) {
        return Ok(Some(schema.column_name.clone()));
    }
    if index >= backend.num_columns() {
        return Ok(None);
    }
    backend.column_name(index).map(Some)
}

/// First position of each column name.
fn name_positions(
    backend: &dyn TableBackend,
    cache: Option<&[ColumnSchema]>,
) -> BackendResult<HashMap<String, usize>> {
    let mut positions = HashMap::new();
    match cache {
        Some(schema) => {
            for s in schema {
                positions.entry(s.column_name.clone()).or_insert(s.column_index);
            }
        }
        None => {
            for i in 0..backend.num_columns() {
                positions.entry(backend.column_name(i)?).or_insert(i);
            }
        }
    }
    Ok(positions)
}

fn schemas_differ(old: &[ColumnSchema], new: &[ColumnSchema]) -> bool {
    old.len() != new.len()
        || old.iter().zip(new).any(|(a, b)| {
            a.column_name != b.column_name
                || a.type_name != b.type_name
                || a.type_display != b.type_display
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PolarsBackend, RecordsBackend};
    use crate::comm::{ColumnSortKey, RowFilter, RowFilterKind};
    use polars::prelude::*;

    fn eager_state(backend: &dyn TableBackend) -> DataExplorerState {
        let mut state = DataExplorerState::new();
        prepare_schema_cache(backend, &mut state, &SchemaCacheLimits::default()).unwrap();
        state
    }

    fn abc() -> PolarsBackend {
        PolarsBackend::new(df!("a" => &[1i64], "b" => &["x"], "c" => &[1.0f64]).unwrap())
    }

    #[test]
    fn unchanged_table_keeps_everything() {
        let old = abc();
        let mut state = eager_state(&old);
        state.sort_keys = vec![ColumnSortKey {
            column_index: 2,
            ascending: true,
        }];
        let r = reconcile(state, &old, &abc(), &SchemaCacheLimits::default());
        assert!(!r.schema_changed);
        assert_eq!(r.state.sort_keys[0].column_index, 2);
    }

    #[test]
    fn retyped_column_revalidates_filter() {
        let old = abc();
        let mut state = eager_state(&old);
        let b = state.schema_cache.as_ref().unwrap()[1].clone();
        state.row_filters = vec![RowFilter::new("empty", b, RowFilterKind::IsEmpty)];

        let new = PolarsBackend::new(df!("a" => &[1i64], "b" => &[2i64], "c" => &[1.0f64]).unwrap());
        let r = reconcile(state, &old, &new, &SchemaCacheLimits::default());
        assert!(r.schema_changed);
        let f = &r.state.row_filters[0];
        assert!(!f.is_valid);
        assert_eq!(f.error_message.as_deref(), Some(UNSUPPORTED_FILTER_MESSAGE));
        assert_eq!(f.column_schema.type_name, "i64");
    }

    #[test]
    fn sort_key_on_deleted_column_is_dropped() {
        let old = abc();
        let mut state = eager_state(&old);
        state.sort_keys = vec![
            ColumnSortKey {
                column_index: 1,
                ascending: true,
            },
            ColumnSortKey {
                column_index: 2,
                ascending: false,
            },
        ];
        let new = PolarsBackend::new(df!("c" => &[1.0f64], "a" => &[1i64]).unwrap());
        let r = reconcile(state, &old, &new, &SchemaCacheLimits::default());
        assert!(r.schema_changed);
        assert_eq!(
            r.state.sort_keys,
            vec![ColumnSortKey {
                column_index: 0,
                ascending: false
            }]
        );
    }

    #[test]
    fn different_backend_kind_resets_state() {
        let old = abc();
        let mut state = eager_state(&old);
        state.sort_keys = vec![ColumnSortKey {
            column_index: 0,
            ascending: true,
        }];
        let new = RecordsBackend::new(vec!["a".into()], vec![]);
        let r = reconcile(state, &old, &new, &SchemaCacheLimits::default());
        assert!(r.schema_changed);
        assert!(r.state.sort_keys.is_empty());
        assert!(r.state.row_filters.is_empty());
    }

    #[test]
    fn large_tables_report_change_without_diffing() {
        let tight = SchemaCacheLimits {
            max_cached_columns: 1,
            max_cached_cells: 10,
        };
        let old = abc();
        let mut state = DataExplorerState::new();
        prepare_schema_cache(&old, &mut state, &tight).unwrap();
        state.sort_keys = vec![ColumnSortKey {
            column_index: 1,
            ascending: true,
        }];
        let r = reconcile(state, &old, &abc(), &tight);
        assert!(r.schema_changed);
        assert_eq!(r.state.sort_keys[0].column_index, 1);
        assert!(r.state.schema_cache.is_none());
    }
}
