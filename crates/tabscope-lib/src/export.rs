//! Export of a selection of visible cells as CSV, TSV or HTML text.
//!
//! Selections address rows by visible position, so filtering and sorting
//! apply. Values are written unformatted.

use tracing::debug;

use crate::backend::TableBackend;
use crate::comm::{ExportFormat, ExportedData, TableSelection};
use crate::error::{ExplorerError, ExplorerResult};
use crate::scalar::Scalar;
use crate::view::ViewIndices;

/// Resolved rectangle of table rows and columns.
struct Block {
    rows: Vec<usize>,
    columns: Vec<usize>,
}

pub fn export_selection(
    backend: &dyn TableBackend,
    view: &ViewIndices,
    selection: &TableSelection,
    format: ExportFormat,
) -> ExplorerResult<ExportedData> {
    if let TableSelection::SingleCell(cell) = selection {
        let block = resolve(backend, view, selection)?;
        let (Some(&row), Some(&column)) = (block.rows.first(), block.columns.first()) else {
            return Err(ExplorerError::IndexError(format!(
                "cell ({}, {}) is outside the table",
                cell.row_index, cell.column_index
            )));
        };
        let value = backend
            .gather(column, Some(&[row]))?
            .into_iter()
            .next()
            .unwrap_or(Scalar::Null);
        return Ok(ExportedData {
            data: value.to_raw_string(),
            format,
        });
    }

    let block = resolve(backend, view, selection)?;
    debug!(
        rows = block.rows.len(),
        columns = block.columns.len(),
        ?format,
        "exporting selection"
    );
    let header = block
        .columns
        .iter()
        .map(|&c| backend.column_name(c))
        .collect::<Result<Vec<_>, _>>()?;
    let cells = block
        .columns
        .iter()
        .map(|&c| backend.gather(c, Some(&block.rows)))
        .collect::<Result<Vec<_>, _>>()?;
    let records: Vec<Vec<String>> = (0..block.rows.len())
        .map(|r| cells.iter().map(|col| col[r].to_raw_string()).collect())
        .collect();

    let data = match format {
        ExportFormat::Csv => delimited(b',', &header, &records)?,
        ExportFormat::Tsv => delimited(b'\t', &header, &records)?,
        ExportFormat::Html => html_table(&header, &records),
    };
    Ok(ExportedData { data, format })
}

fn resolve(
    backend: &dyn TableBackend,
    view: &ViewIndices,
    selection: &TableSelection,
) -> ExplorerResult<Block> {
    let all_columns = || (0..backend.num_columns()).collect::<Vec<_>>();
    let all_rows = || -> Vec<usize> {
        match view.visible_rows() {
            Some(rows) => rows.to_vec(),
            None => (0..backend.num_rows()).collect(),
        }
    };
    Ok(match selection {
        TableSelection::SingleCell(c) => Block {
            rows: view.rows_at(backend, &[c.row_index])?,
            columns: column_positions(backend, &[c.column_index])?,
        },
        TableSelection::CellRange(r) => Block {
            rows: view.rows_in_range(backend, r.first_row_index, r.last_row_index)?,
            columns: column_range(backend, r.first_column_index, r.last_column_index)?,
        },
        TableSelection::CellIndices(c) => Block {
            rows: view.rows_at(backend, &c.row_indices)?,
            columns: column_positions(backend, &c.column_indices)?,
        },
        TableSelection::RowRange(r) => Block {
            rows: view.rows_in_range(backend, r.first_index, r.last_index)?,
            columns: all_columns(),
        },
        TableSelection::ColumnRange(r) => Block {
            rows: all_rows(),
            columns: column_range(backend, r.first_index, r.last_index)?,
        },
        TableSelection::RowIndices(i) => Block {
            rows: view.rows_at(backend, &i.indices)?,
            columns: all_columns(),
        },
        TableSelection::ColumnIndices(i) => Block {
            rows: all_rows(),
            columns: column_positions(backend, &i.indices)?,
        },
    })
}

fn column_range(backend: &dyn TableBackend, first: i64, last: i64) -> ExplorerResult<Vec<usize>> {
    if first < 0 || last < 0 {
        return Err(ExplorerError::IndexError(format!(
            "negative column range {}..={}",
            first, last
        )));
    }
    if last < first {
        return Err(ExplorerError::InvalidRequest(format!(
            "column range end {} precedes start {}",
            last, first
        )));
    }
    let num_columns = backend.num_columns();
    let first = first as usize;
    if first >= num_columns {
        return Ok(Vec::new());
    }
    Ok((first..=(last as usize).min(num_columns - 1)).collect())
}

fn column_positions(backend: &dyn TableBackend, indices: &[i64]) -> ExplorerResult<Vec<usize>> {
    if let Some(bad) = indices.iter().find(|&&i| i < 0) {
        return Err(ExplorerError::IndexError(format!(
            "column index {} is negative",
            bad
        )));
    }
    let num_columns = backend.num_columns();
    Ok(indices
        .iter()
        .map(|&i| i as usize)
        .filter(|&i| i < num_columns)
        .collect())
}

fn delimited(delimiter: u8, header: &[String], records: &[Vec<String>]) -> ExplorerResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for record in records {
        writer.write_record(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExplorerError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn html_table(header: &[String], records: &[Vec<String>]) -> String {
    let mut out = String::from("<table>\n<tr>");
    for name in header {
        out.push_str("<th>");
        out.push_str(&escape_html(name));
        out.push_str("</th>");
    }
    out.push_str("</tr>\n");
    for record in records {
        out.push_str("<tr>");
        for value in record {
            out.push_str("<td>");
            out.push_str(&escape_html(value));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>");
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
