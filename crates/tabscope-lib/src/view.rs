//! View index manager: the filtered and sorted row positions of one view.

use tracing::debug;

use crate::backend::TableBackend;
use crate::comm::FilterResult;
use crate::error::{ExplorerError, ExplorerResult};
use crate::filter::{apply_row_filters, resolve_filter_schemas};
use crate::sort::sort_rows;
use crate::state::DataExplorerState;

#[derive(Debug, Clone, Default)]
pub struct ViewIndices {
    filtered_indices: Option<Vec<usize>>,
    row_view_indices: Option<Vec<usize>>,
    /// Reserved for column-level filtering; never populated.
    column_view_indices: Option<Vec<usize>>,
    filters_dirty: bool,
    sort_dirty: bool,
    last_filter_result: Option<FilterResult>,
}

impl ViewIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered_indices(&self) -> Option<&[usize]> {
        self.filtered_indices.as_deref()
    }

    pub fn row_view_indices(&self) -> Option<&[usize]> {
        self.row_view_indices.as_deref()
    }

    pub fn column_view_indices(&self) -> Option<&[usize]> {
        self.column_view_indices.as_deref()
    }

    pub fn last_filter_result(&self) -> Option<FilterResult> {
        self.last_filter_result
    }

    pub fn is_dirty(&self) -> bool {
        self.filters_dirty || self.sort_dirty
    }

    pub fn mark_sort_dirty(&mut self) {
        self.sort_dirty = true;
    }

    /// Drop every computed index; the next read recomputes both passes.
    pub fn invalidate(&mut self) {
        self.filtered_indices = None;
        self.row_view_indices = None;
        self.column_view_indices = None;
        self.last_filter_result = None;
        self.filters_dirty = true;
        self.sort_dirty = true;
    }

    /// Run the filter pass now. Sorting is deferred to the next read.
    pub fn apply_filters(
        &mut self,
        backend: &dyn TableBackend,
        state: &mut DataExplorerState,
    ) -> ExplorerResult<FilterResult> {
        let schemas = resolve_filter_schemas(backend, state)?;
        let outcome = apply_row_filters(backend, &mut state.row_filters, &schemas);
        self.filtered_indices = outcome.indices;
        self.last_filter_result = Some(outcome.result);
        self.filters_dirty = false;
        self.sort_dirty = true;
        Ok(outcome.result)
    }

    /// One filter pass and one sort pass if anything changed since the last read.
    pub fn recompute_if_needed(
        &mut self,
        backend: &dyn TableBackend,
        state: &mut DataExplorerState,
    ) -> ExplorerResult<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        if self.filters_dirty {
            self.apply_filters(backend, state)?;
        }
        debug!("recomputing row view");
        self.row_view_indices = sort_rows(backend, &state.sort_keys, self.filtered_indices())?;
        self.sort_dirty = false;
        Ok(())
    }

    /// Rows the client can see, in display order. `None` is every row in
    /// table order.
    pub fn visible_rows(&self) -> Option<&[usize]> {
        self.row_view_indices().or(self.filtered_indices())
    }

    pub fn num_visible_rows(&self, backend: &dyn TableBackend) -> usize {
        self.visible_rows()
            .map(<[usize]>::len)
            .unwrap_or_else(|| backend.num_rows())
    }

    /// Table row positions for visible positions `first..=last`, clamped to
    /// the visible row count.
    pub fn rows_in_range(
        &self,
        backend: &dyn TableBackend,
        first: i64,
        last: i64,
    ) -> ExplorerResult<Vec<usize>> {
        if first < 0 || last < 0 {
            return Err(ExplorerError::IndexError(format!(
                "negative row range {}..={}",
                first, last
            )));
        }
        if last < first {
            return Err(ExplorerError::InvalidRequest(format!(
                "row range end {} precedes start {}",
                last, first
            )));
        }
        let visible = self.num_visible_rows(backend);
        let first = first as usize;
        if first >= visible {
            return Ok(Vec::new());
        }
        let last = (last as usize).min(visible - 1);
        Ok(self.map_positions(first..=last))
    }

    /// Table row positions for explicit visible positions. Positions past the
    /// end are dropped.
    pub fn rows_at(&self, backend: &dyn TableBackend, positions: &[i64]) -> ExplorerResult<Vec<usize>> {
        if let Some(bad) = positions.iter().find(|&&p| p < 0) {
            return Err(ExplorerError::IndexError(format!("row index {} is negative", bad)));
        }
        let visible = self.num_visible_rows(backend);
        Ok(self.map_positions(
            positions
                .iter()
                .map(|&p| p as usize)
                .filter(|&p| p < visible),
        ))
    }

    fn map_positions(&self, positions: impl Iterator<Item = usize>) -> Vec<usize> {
        match self.visible_rows() {
            Some(rows) => positions.map(|p| rows[p]).collect(),
            None => positions.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PolarsBackend;
    use crate::comm::{ColumnSortKey, CompareOp, CompareParams, RowFilter, RowFilterKind};
    use crate::schema::column_schema;
    use polars::prelude::*;

    fn setup() -> (PolarsBackend, DataExplorerState) {
        let b = PolarsBackend::new(
            df!(
                "a" => &[3i64, 1, 2, 5],
                "b" => &["x", "y", "x", "x"],
            )
            .unwrap(),
        );
        (b, DataExplorerState::new())
    }

    #[test]
    fn filter_then_lazy_sort() {
        let (b, mut state) = setup();
        let schema = column_schema(&b, &mut state, 1).unwrap();
        state.row_filters = vec![RowFilter::new(
            "bx",
            schema,
            RowFilterKind::Compare(CompareParams {
                op: CompareOp::Eq,
                value: "x".to_string(),
            }),
        )];
        let mut view = ViewIndices::new();
        let result = view.apply_filters(&b, &mut state).unwrap();
        assert_eq!(result.selected_num_rows, 3);
        assert_eq!(view.filtered_indices(), Some(&[0, 2, 3][..]));
        assert!(view.is_dirty());

        state.sort_keys = vec![ColumnSortKey {
            column_index: 0,
            ascending: false,
        }];
        view.mark_sort_dirty();
        view.recompute_if_needed(&b, &mut state).unwrap();
        assert!(!view.is_dirty());
        assert_eq!(view.row_view_indices(), Some(&[3, 0, 2][..]));
        assert_eq!(view.rows_in_range(&b, 1, 10).unwrap(), vec![0, 2]);
        assert_eq!(view.rows_at(&b, &[2, 0, 9]).unwrap(), vec![2, 3]);
    }

    #[test]
    fn range_validation() {
        let (b, _) = setup();
        let view = ViewIndices::new();
        assert!(matches!(
            view.rows_in_range(&b, -1, 2),
            Err(ExplorerError::IndexError(_))
        ));
        assert!(matches!(
            view.rows_in_range(&b, 3, 1),
            Err(ExplorerError::InvalidRequest(_))
        ));
        assert_eq!(view.rows_in_range(&b, 10, 12).unwrap(), Vec::<usize>::new());
        assert_eq!(view.rows_in_range(&b, 0, 1).unwrap(), vec![0, 1]);
    }

    #[test]
    fn invalidate_forces_full_recompute() {
        let (b, mut state) = setup();
        let mut view = ViewIndices::new();
        view.invalidate();
        view.recompute_if_needed(&b, &mut state).unwrap();
        assert_eq!(view.filtered_indices(), None);
        assert_eq!(view.row_view_indices(), None);
        assert_eq!(view.last_filter_result().unwrap().selected_num_rows, 4);
        assert_eq!(view.column_view_indices(), None);
    }
}
