mod common;

use common::{column, compare, open_backend, open_frame};
use polars::prelude::*;
use std::sync::Arc;
use tabscope_lib::comm::{ColumnSortKey, CompareOp, ExplorerEvent};
use tabscope_lib::filter::DELETED_COLUMN_MESSAGE;
use tabscope_lib::scalar::Scalar;
use tabscope_lib::{PolarsBackend, RecordsBackend};

fn three_columns() -> DataFrame {
    df!(
        "region" => &["north", "south", "east", "west"],
        "units" => &[12i64, 3, 40, 25],
        "price" => &[2.5f64, 10.0, 4.25, 1.0]
    )
    .unwrap()
}

fn key(column_index: usize, ascending: bool) -> ColumnSortKey {
    ColumnSortKey {
        column_index,
        ascending,
    }
}

#[test]
fn test_moved_columns_keep_filters_and_sort_keys() {
    let (mut explorer, rx) = open_frame(three_columns());
    let units = column(&mut explorer, 1);
    explorer
        .set_row_filters(vec![compare("units", units, CompareOp::Gt, "10")])
        .unwrap();
    explorer.set_sort_columns(vec![key(2, true)]).unwrap();

    let moved = df!(
        "region" => &["north", "south", "east", "west"],
        "price" => &[2.5f64, 10.0, 4.25, 1.0],
        "units" => &[12i64, 3, 40, 25]
    )
    .unwrap();
    assert!(explorer.notify_table_replaced(Arc::new(PolarsBackend::new(moved))));
    assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::SchemaUpdate);

    let state = explorer.get_state().unwrap();
    assert_eq!(state.row_filters[0].column_schema.column_index, 2);
    assert!(state.row_filters[0].is_valid);
    assert_eq!(state.sort_keys, vec![key(1, true)]);
    assert_eq!(state.table_shape.num_rows, 3);
    assert_eq!(explorer.row_view_indices().unwrap(), Some(&[3, 0, 2][..]));
}

#[test]
fn test_deleted_columns_invalidate_filters_and_drop_sort_keys() {
    let (mut explorer, rx) = open_frame(three_columns());
    let units = column(&mut explorer, 1);
    explorer
        .set_row_filters(vec![compare("units", units, CompareOp::Gt, "10")])
        .unwrap();
    explorer
        .set_sort_columns(vec![key(1, false), key(0, true)])
        .unwrap();

    let without_units = df!(
        "region" => &["north", "south", "east", "west"],
        "price" => &[2.5f64, 10.0, 4.25, 1.0]
    )
    .unwrap();
    assert!(explorer.notify_table_replaced(Arc::new(PolarsBackend::new(without_units))));
    assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::SchemaUpdate);

    let state = explorer.get_state().unwrap();
    assert!(!state.row_filters[0].is_valid);
    assert_eq!(
        state.row_filters[0].error_message.as_deref(),
        Some(DELETED_COLUMN_MESSAGE)
    );
    assert_eq!(state.sort_keys, vec![key(0, true)]);
    assert_eq!(state.table_shape.num_rows, 4);
}

#[test]
fn test_same_schema_new_rows_is_a_data_update() {
    let (mut explorer, rx) = open_frame(three_columns());
    let units = column(&mut explorer, 1);
    explorer
        .set_row_filters(vec![compare("units", units, CompareOp::Gt, "10")])
        .unwrap();

    let more_rows = df!(
        "region" => &["north", "south", "east", "west", "north"],
        "units" => &[1i64, 2, 3, 4, 50],
        "price" => &[2.5f64, 10.0, 4.25, 1.0, 7.0]
    )
    .unwrap();
    assert!(!explorer.notify_table_replaced(Arc::new(PolarsBackend::new(more_rows))));
    assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::DataUpdate);
    assert_eq!(explorer.filtered_indices().unwrap(), Some(&[4][..]));
}

#[test]
fn test_replacing_with_a_different_backend_kind_resets_state() {
    let (mut explorer, rx) = open_frame(three_columns());
    let units = column(&mut explorer, 1);
    explorer
        .set_row_filters(vec![compare("units", units, CompareOp::Gt, "10")])
        .unwrap();
    explorer.set_sort_columns(vec![key(0, true)]).unwrap();

    let records = RecordsBackend::new(
        vec!["region".to_string(), "units".to_string()],
        vec![
            vec![Scalar::Str("north".to_string()), Scalar::Int(12)],
            vec![Scalar::Str("south".to_string()), Scalar::Int(3)],
        ],
    );
    assert!(explorer.notify_table_replaced(Arc::new(records)));
    assert_eq!(rx.try_recv().unwrap(), ExplorerEvent::SchemaUpdate);

    let state = explorer.get_state().unwrap();
    assert!(state.row_filters.is_empty());
    assert!(state.sort_keys.is_empty());
    assert_eq!(state.table_shape.num_rows, 2);
}

#[test]
fn test_records_backend_infers_object_column_types() {
    let records = RecordsBackend::new(
        vec!["label".to_string(), "score".to_string()],
        vec![
            vec![Scalar::Str("a".to_string()), Scalar::Int(3)],
            vec![Scalar::Str("b".to_string()), Scalar::Null],
            vec![Scalar::Str("c".to_string()), Scalar::Int(9)],
        ],
    );
    let (mut explorer, _rx) = open_backend(Arc::new(records));
    let score = column(&mut explorer, 1);
    assert_eq!(score.type_name, "object");

    explorer
        .set_row_filters(vec![compare("score", score, CompareOp::GtEq, "5")])
        .unwrap();
    assert_eq!(explorer.filtered_indices().unwrap(), Some(&[2][..]));
}
