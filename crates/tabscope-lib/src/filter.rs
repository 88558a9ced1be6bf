//! Row filter engine.
//!
//! Each filter is evaluated on its own into a boolean mask; failing or
//! unsupported filters are marked invalid and skipped. Valid masks are folded
//! left to right by their condition.

use tracing::{debug, warn};

use crate::backend::TableBackend;
use crate::comm::{ColumnSchema, FilterResult, RowFilter, RowFilterCondition};
use crate::error::{BackendError, BackendResult};
use crate::error_display::user_message_from_backend;
use crate::features::{row_filter_supported, UNSUPPORTED_FILTER_MESSAGE};
use crate::schema::column_schema;
use crate::state::DataExplorerState;

pub const DELETED_COLUMN_MESSAGE: &str = "Column was deleted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Ascending surviving row positions; `None` selects every row.
    pub indices: Option<Vec<usize>>,
    pub result: FilterResult,
}

/// Current schema for each filter's column, `None` where the filter's column
/// index no longer holds a column of the same name.
pub fn resolve_filter_schemas(
    backend: &dyn TableBackend,
    state: &mut DataExplorerState,
) -> BackendResult<Vec<Option<ColumnSchema>>> {
    let num_columns = backend.num_columns();
    let targets: Vec<(usize, String)> = state
        .row_filters
        .iter()
        .map(|f| (f.column_schema.column_index, f.column_schema.column_name.clone()))
        .collect();
    let mut out = Vec::with_capacity(targets.len());
    for (index, name) in targets {
        if index >= num_columns {
            out.push(None);
            continue;
        }
        let schema = column_schema(backend, state, index)?;
        out.push((schema.column_name == name).then_some(schema));
    }
    Ok(out)
}

/// Evaluate `filters` against `backend`, recording validity on each filter.
/// `schemas` is aligned with `filters`.
pub fn apply_row_filters(
    backend: &dyn TableBackend,
    filters: &mut [RowFilter],
    schemas: &[Option<ColumnSchema>],
) -> FilterOutcome {
    let num_rows = backend.num_rows();
    if filters.is_empty() {
        return FilterOutcome {
            indices: None,
            result: FilterResult {
                selected_num_rows: num_rows,
                had_errors: false,
            },
        };
    }

    let mut combined: Option<Vec<bool>> = None;
    let mut had_errors = false;

    for (filter, schema) in filters.iter_mut().zip(schemas.iter()) {
        let Some(schema) = schema else {
            filter.invalidate(DELETED_COLUMN_MESSAGE);
            continue;
        };
        if !row_filter_supported(filter.filter_type(), schema.type_display) {
            debug!(
                filter_id = %filter.filter_id,
                column = %schema.column_name,
                "skipping filter unsupported for column type"
            );
            filter.column_schema = schema.clone();
            filter.invalidate(UNSUPPORTED_FILTER_MESSAGE);
            continue;
        }

        let mask = backend
            .filter_mask(schema.column_index, &filter.kind, schema.type_display)
            .and_then(|mask| {
                if mask.len() == num_rows {
                    Ok(mask)
                } else {
                    Err(BackendError::evaluation(format!(
                        "filter produced {} values for {} rows",
                        mask.len(),
                        num_rows
                    )))
                }
            });
        filter.column_schema = schema.clone();
        match mask {
            Ok(mask) => {
                filter.mark_valid();
                let mask: Vec<bool> = mask.into_iter().map(|m| m.unwrap_or(false)).collect();
                combined = Some(match combined {
                    None => mask,
                    Some(prev) => combine(prev, &mask, filter.condition),
                });
            }
            Err(err) => {
                let message = user_message_from_backend(&err);
                warn!(filter_id = %filter.filter_id, error = %message, "row filter failed");
                filter.invalidate(message);
                had_errors = true;
            }
        }
    }

    match combined {
        None => FilterOutcome {
            indices: None,
            result: FilterResult {
                selected_num_rows: num_rows,
                had_errors,
            },
        },
        Some(mask) => {
            let indices: Vec<usize> = mask
                .iter()
                .enumerate()
                .filter_map(|(i, keep)| keep.then_some(i))
                .collect();
            debug!(selected = indices.len(), total = num_rows, "row filters applied");
            FilterOutcome {
                result: FilterResult {
                    selected_num_rows: indices.len(),
                    had_errors,
                },
                indices: Some(indices),
            }
        }
    }
}

fn combine(mut prev: Vec<bool>, next: &[bool], condition: RowFilterCondition) -> Vec<bool> {
    for (p, n) in prev.iter_mut().zip(next) {
        *p = match condition {
            RowFilterCondition::And => *p && *n,
            RowFilterCondition::Or => *p || *n,
        };
    }
    prev
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PolarsBackend;
    use crate::comm::{
        CompareOp, CompareParams, RowFilterKind, TextSearchParams, TextSearchType,
    };
    use crate::schema::inspect_all;
    use polars::prelude::*;

    fn backend() -> PolarsBackend {
        PolarsBackend::new(
            df!(
                "a" => &[Some(3i64), Some(1), None, Some(2), Some(5)],
                "b" => &["x", "y", "x", "z", "x"],
            )
            .unwrap(),
        )
    }

    fn schemas(b: &PolarsBackend) -> Vec<ColumnSchema> {
        inspect_all(b, &mut DataExplorerState::new()).unwrap()
    }

    fn compare(schema: &ColumnSchema, op: CompareOp, value: &str) -> RowFilter {
        RowFilter::new(
            format!("{}{:?}{}", schema.column_name, op, value),
            schema.clone(),
            RowFilterKind::Compare(CompareParams {
                op,
                value: value.to_string(),
            }),
        )
    }

    fn run(b: &PolarsBackend, filters: &mut [RowFilter]) -> FilterOutcome {
        let current: Vec<Option<ColumnSchema>> = filters
            .iter()
            .map(|f| schemas(b).get(f.column_schema.column_index).cloned())
            .collect();
        apply_row_filters(b, filters, &current)
    }

    #[test]
    fn empty_filter_list_selects_everything() {
        let b = backend();
        let out = run(&b, &mut []);
        assert_eq!(out.indices, None);
        assert_eq!(out.result.selected_num_rows, 5);
        assert!(!out.result.had_errors);
    }

    #[test]
    fn and_or_fold_left_to_right() {
        let b = backend();
        let s = schemas(&b);
        let mut filters = vec![
            compare(&s[1], CompareOp::Eq, "x"),
            compare(&s[0], CompareOp::Gt, "2"),
        ];
        let out = run(&b, &mut filters);
        assert_eq!(out.indices, Some(vec![0, 4]));

        let mut filters = vec![
            compare(&s[1], CompareOp::Eq, "y"),
            compare(&s[0], CompareOp::GtEq, "5").with_condition(RowFilterCondition::Or),
        ];
        let out = run(&b, &mut filters);
        assert_eq!(out.indices, Some(vec![1, 4]));
    }

    #[test]
    fn nulls_are_excluded() {
        let b = backend();
        let s = schemas(&b);
        let mut filters = vec![compare(&s[0], CompareOp::NotEq, "100")];
        let out = run(&b, &mut filters);
        assert_eq!(out.indices, Some(vec![0, 1, 3, 4]));
    }

    #[test]
    fn failing_filter_is_recorded_and_others_still_apply() {
        let b = backend();
        let s = schemas(&b);
        let mut filters = vec![
            compare(&s[0], CompareOp::Eq, "not-a-number"),
            compare(&s[1], CompareOp::Eq, "x"),
        ];
        let out = run(&b, &mut filters);
        assert!(out.result.had_errors);
        assert!(!filters[0].is_valid);
        assert!(filters[0].error_message.is_some());
        assert!(filters[1].is_valid);
        assert_eq!(out.indices, Some(vec![0, 2, 4]));
    }

    #[test]
    fn unsupported_filter_is_skipped_without_error() {
        let b = backend();
        let s = schemas(&b);
        let mut filters = vec![RowFilter::new(
            "search-number",
            s[0].clone(),
            RowFilterKind::Search(TextSearchParams {
                search_type: TextSearchType::Contains,
                term: "1".to_string(),
                case_sensitive: true,
            }),
        )];
        let out = run(&b, &mut filters);
        assert!(!out.result.had_errors);
        assert!(!filters[0].is_valid);
        assert_eq!(
            filters[0].error_message.as_deref(),
            Some(UNSUPPORTED_FILTER_MESSAGE)
        );
        assert_eq!(out.indices, None);
        assert_eq!(out.result.selected_num_rows, 5);
    }

    #[test]
    fn missing_column_marks_filter_deleted() {
        let b = backend();
        let s = schemas(&b);
        let mut filters = vec![compare(&s[0], CompareOp::Eq, "1")];
        let out = apply_row_filters(&b, &mut filters, &[None]);
        assert_eq!(out.indices, None);
        assert_eq!(filters[0].error_message.as_deref(), Some(DELETED_COLUMN_MESSAGE));
    }
}
