//! Per-view mutable state.

use std::collections::HashMap;

use crate::comm::{ColumnSchema, ColumnSortKey, RowFilter};

/// Filters, sort keys and schema caches for one open view. Replaced
/// wholesale when the underlying table changes shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataExplorerState {
    pub row_filters: Vec<RowFilter>,
    pub sort_keys: Vec<ColumnSortKey>,
    /// Whole-table schema, present only when eager inspection is cheap enough.
    pub schema_cache: Option<Vec<ColumnSchema>>,
    /// Schemas computed on demand when no whole-table cache exists.
    pub schema_memo: HashMap<usize, ColumnSchema>,
    /// Inferred value type per dynamically typed column.
    pub inferred_dtype_cache: HashMap<usize, String>,
}

impl DataExplorerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_schema_caches(&mut self) {
        self.schema_cache = None;
        self.schema_memo.clear();
        self.inferred_dtype_cache.clear();
    }
}
