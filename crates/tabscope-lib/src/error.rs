//! Error types for the explorer engine and its backends.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised by a [`crate::backend::TableBackend`] primitive.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend does not provide this operation at all. Callers must not retry.
    #[error("operation not implemented by this backend: {0}")]
    NotImplemented(&'static str),

    #[error("column index {index} out of range for table with {num_columns} columns")]
    ColumnOutOfRange { index: usize, num_columns: usize },

    /// The operation ran and failed on the data it was given.
    #[error("{0}")]
    Evaluation(String),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl BackendError {
    pub fn evaluation(msg: impl Into<String>) -> Self {
        BackendError::Evaluation(msg.into())
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Top-level error for a single explorer request.
#[derive(Debug, Error)]
pub enum ExplorerError {
    /// Malformed request, e.g. a selection range whose end precedes its start.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("index error: {0}")]
    IndexError(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("backend error: {0}")]
    Backend(BackendError),

    #[error(transparent)]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for ExplorerError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotImplemented(op) => ExplorerError::NotImplemented(op.to_string()),
            BackendError::ColumnOutOfRange { index, num_columns } => ExplorerError::IndexError(
                format!("column index {index} out of range ({num_columns} columns)"),
            ),
            BackendError::Polars(e) => ExplorerError::Polars(e),
            other => ExplorerError::Backend(other),
        }
    }
}

pub type ExplorerResult<T> = std::result::Result<T, ExplorerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_implemented_stays_distinct_from_evaluation() {
        let err: ExplorerError = BackendError::NotImplemented("row_labels").into();
        assert!(matches!(err, ExplorerError::NotImplemented(ref op) if op == "row_labels"));

        let err: ExplorerError = BackendError::evaluation("bad compare").into();
        assert!(matches!(err, ExplorerError::Backend(BackendError::Evaluation(_))));
    }

    #[test]
    fn column_out_of_range_is_index_error() {
        let err: ExplorerError = BackendError::ColumnOutOfRange {
            index: 7,
            num_columns: 3,
        }
        .into();
        assert!(matches!(err, ExplorerError::IndexError(_)));
        assert!(err.to_string().contains('7'));
    }
}
