#![allow(dead_code)]

use polars::prelude::*;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tabscope_lib::comm::{
    ColumnProfileResult, ColumnSchema, ColumnValue, CompareOp, CompareParams, ExplorerEvent,
    RowFilter, RowFilterKind,
};
use tabscope_lib::{DataExplorer, ExplorerConfig, PolarsBackend, TableBackend};

/// Six rows of sales data with a missing `units` value and duplicated regions.
pub fn sales_frame() -> DataFrame {
    df!(
        "region" => &["north", "south", "east", "north", "west", "south"],
        "units" => &[Some(12i64), Some(7), None, Some(30), Some(7), Some(18)],
        "price" => &[2.5f64, 10.0, 4.25, 1.0, 8.75, 3.5],
        "active" => &[true, false, true, true, false, true]
    )
    .unwrap()
}

pub fn open_backend(backend: Arc<dyn TableBackend>) -> (DataExplorer, Receiver<ExplorerEvent>) {
    let (tx, rx) = mpsc::channel();
    let explorer = DataExplorer::new("sales", backend, ExplorerConfig::default(), tx).unwrap();
    (explorer, rx)
}

pub fn open_frame(df: DataFrame) -> (DataExplorer, Receiver<ExplorerEvent>) {
    open_backend(Arc::new(PolarsBackend::new(df)))
}

pub fn column(explorer: &mut DataExplorer, index: usize) -> ColumnSchema {
    explorer
        .get_schema(&[index as i64])
        .unwrap()
        .columns
        .remove(0)
}

pub fn compare(id: &str, schema: ColumnSchema, op: CompareOp, value: &str) -> RowFilter {
    RowFilter::new(
        id,
        schema,
        RowFilterKind::Compare(CompareParams {
            op,
            value: value.to_string(),
        }),
    )
}

pub fn formatted(values: &[&str]) -> Vec<ColumnValue> {
    values
        .iter()
        .map(|v| ColumnValue::Formatted(v.to_string()))
        .collect()
}

/// Next profile results for `callback_id`, skipping unrelated events.
pub fn recv_profiles(rx: &Receiver<ExplorerEvent>, callback_id: &str) -> Vec<ColumnProfileResult> {
    loop {
        match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
            ExplorerEvent::ColumnProfilesReady {
                callback_id: id,
                profiles,
            } if id == callback_id => return profiles,
            _ => continue,
        }
    }
}
