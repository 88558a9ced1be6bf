//! User-facing error message formatting.
//!
//! Uses typed error matching (PolarsError variants, io::ErrorKind) rather than
//! string parsing to produce messages a client can show next to a filter or
//! print from the CLI.

use polars::prelude::PolarsError;
use std::io;
use std::path::Path;

use crate::error::{BackendError, ExplorerError};

/// Format a PolarsError as a user-facing message by matching on its variant.
pub fn user_message_from_polars(err: &PolarsError) -> String {
    use polars::prelude::PolarsError as PE;

    match err {
        PE::ColumnNotFound(msg) => format!("Column not found: {}", msg),
        PE::IO { error, msg } => {
            user_message_from_io(error.as_ref(), msg.as_ref().map(|m| m.as_ref()))
        }
        PE::NoData(msg) => format!("No data: {}", msg),
        PE::SchemaMismatch(msg) => format!("Type mismatch: {}", msg),
        PE::ShapeMismatch(msg) => format!("Row shape mismatch: {}", msg),
        PE::InvalidOperation(msg) => format!("Operation not allowed for this column: {}", msg),
        PE::OutOfBounds(msg) => format!("Index or row out of bounds: {}", msg),
        PE::ComputeError(msg) => simplify_compute_message(msg),
        PE::Context { error, msg } => {
            let inner = user_message_from_polars(error);
            format!("{}: {}", msg, inner)
        }
        #[allow(unreachable_patterns)]
        _ => err.to_string(),
    }
}

/// Message recorded on a filter whose evaluation failed.
pub fn user_message_from_backend(err: &BackendError) -> String {
    match err {
        BackendError::Polars(pe) => user_message_from_polars(pe),
        BackendError::NotImplemented(op) => {
            format!("Filtering is not available for this table ({})", op)
        }
        BackendError::ColumnOutOfRange { index, num_columns } => format!(
            "Column {} no longer exists (table has {} columns)",
            index, num_columns
        ),
        BackendError::Evaluation(msg) => msg.clone(),
    }
}

/// Message for a top-level explorer error.
pub fn user_message_from_explorer(err: &ExplorerError) -> String {
    match err {
        ExplorerError::Backend(be) => user_message_from_backend(be),
        ExplorerError::Polars(pe) => user_message_from_polars(pe),
        ExplorerError::Io(e) => user_message_from_io(e, None),
        other => other.to_string(),
    }
}

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        ErrorKind::OutOfMemory => "Out of memory.".to_string(),
        ErrorKind::Other => {
            let msg = err.to_string();
            if msg.contains("Is a directory") {
                return "Path is a directory, not a file.".to_string();
            }
            return if context.is_some() {
                format!("I/O error: {}", msg)
            } else {
                msg
            };
        }
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain to find PolarsError or io::Error.
pub fn user_message_from_report(report: &color_eyre::eyre::Report, path: Option<&Path>) -> String {
    let with_path = |msg: String| match path {
        Some(p) => format!("Failed to load {}: {}", p.display(), msg),
        None => msg,
    };
    for cause in report.chain() {
        if let Some(pe) = cause.downcast_ref::<PolarsError>() {
            return with_path(user_message_from_polars(pe));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_path(user_message_from_io(io_err, None));
        }
    }

    // Fallback: first line of display to avoid long tracebacks
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_path(first_line.trim().to_string())
}

/// Strip polars-internal phrasing from compute errors.
fn simplify_compute_message(msg: &str) -> String {
    let msg = msg.trim();
    let msg = msg
        .split("\n\nResolved plan until failure")
        .next()
        .unwrap_or(msg);
    let msg = msg.strip_prefix("ComputeError: ").unwrap_or(msg);
    if msg.contains("conversion from") && msg.contains("failed") {
        return format!("Could not convert value: {}", msg);
    }
    msg.to_string()
}
