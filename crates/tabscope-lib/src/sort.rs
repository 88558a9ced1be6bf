//! Multi-key stable sort over an optional filtered row set.

use tracing::{debug, warn};

use crate::backend::TableBackend;
use crate::comm::ColumnSortKey;
use crate::error::BackendResult;

/// Order `filtered` (or every row) by `keys`, first key most significant.
///
/// Keys are applied from least to most significant, each pass a stable sort
/// over the previous pass's order, so ties at every level keep the incoming
/// row order. With no keys the filtered set passes through unchanged. Keys
/// naming a column that no longer exists are skipped.
pub fn sort_rows(
    backend: &dyn TableBackend,
    keys: &[ColumnSortKey],
    filtered: Option<&[usize]>,
) -> BackendResult<Option<Vec<usize>>> {
    let mut order = filtered.map(<[usize]>::to_vec);
    if keys.is_empty() {
        return Ok(order);
    }
    let num_columns = backend.num_columns();
    for key in keys.iter().rev() {
        if key.column_index >= num_columns {
            warn!(column = key.column_index, "ignoring sort key for missing column");
            continue;
        }
        order = Some(backend.argsort(key.column_index, order.as_deref(), key.ascending)?);
    }
    debug!(keys = keys.len(), rows = ?order.as_ref().map(Vec::len), "rows sorted");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PolarsBackend;
    use polars::prelude::*;

    fn key(column_index: usize, ascending: bool) -> ColumnSortKey {
        ColumnSortKey {
            column_index,
            ascending,
        }
    }

    fn backend() -> PolarsBackend {
        PolarsBackend::new(
            df!(
                "g" => &["b", "a", "b", "a", "b"],
                "v" => &[Some(1i64), Some(2), None, Some(2), Some(0)],
            )
            .unwrap(),
        )
    }

    #[test]
    fn no_keys_passes_through() {
        let b = backend();
        assert_eq!(sort_rows(&b, &[], None).unwrap(), None);
        assert_eq!(sort_rows(&b, &[], Some(&[4, 1])).unwrap(), Some(vec![4, 1]));
    }

    #[test]
    fn single_key_is_stable() {
        let b = backend();
        assert_eq!(
            sort_rows(&b, &[key(0, true)], None).unwrap(),
            Some(vec![1, 3, 0, 2, 4])
        );
        assert_eq!(
            sort_rows(&b, &[key(0, false)], None).unwrap(),
            Some(vec![0, 2, 4, 1, 3])
        );
    }

    #[test]
    fn lexicographic_keys() {
        let b = backend();
        let sorted = sort_rows(&b, &[key(0, true), key(1, false)], None).unwrap();
        assert_eq!(sorted, Some(vec![1, 3, 0, 4, 2]));
    }

    #[test]
    fn sorts_only_filtered_rows() {
        let b = backend();
        let sorted = sort_rows(&b, &[key(1, true)], Some(&[0, 2, 4])).unwrap();
        assert_eq!(sorted, Some(vec![4, 0, 2]));
    }

    #[test]
    fn missing_column_keys_are_ignored() {
        let b = backend();
        let sorted = sort_rows(&b, &[key(9, true), key(1, true)], None).unwrap();
        assert_eq!(sorted, Some(vec![4, 0, 1, 3, 2]));
    }
}
