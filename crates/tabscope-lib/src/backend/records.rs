//! Backend over row-major records with dynamically typed cells.
//!
//! Every column reports the `object` type tag; its effective type is found by
//! scanning values in [`RecordsBackend::infer_column_type`].

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::{check_column, BackendKind, TableBackend};
use crate::comm::ColumnDisplayType;
use crate::error::{BackendError, BackendResult};
use crate::scalar::{Scalar, TimeUnit};

pub const OBJECT_TYPE_NAME: &str = "object";

#[derive(Debug, Clone, Default)]
pub struct RecordsBackend {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
    labels: Option<Vec<String>>,
}

impl RecordsBackend {
    /// Rows shorter than `columns` are padded with nulls.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Scalar::Null);
                row
            })
            .collect();
        Self {
            columns,
            rows,
            labels: None,
        }
    }

    pub fn with_row_labels(mut self, labels: Vec<String>) -> BackendResult<Self> {
        if labels.len() != self.rows.len() {
            return Err(BackendError::evaluation(format!(
                "expected {} row labels, got {}",
                self.rows.len(),
                labels.len()
            )));
        }
        self.labels = Some(labels);
        Ok(self)
    }

    /// Builds a table from JSON objects; keys missing from a row become nulls.
    pub fn from_json_rows(columns: Vec<String>, rows: &[Value]) -> BackendResult<Self> {
        let mut out = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let Value::Object(map) = row else {
                return Err(BackendError::evaluation(format!(
                    "row {} is not a JSON object",
                    i
                )));
            };
            out.push(
                columns
                    .iter()
                    .map(|c| map.get(c).map(scalar_from_json).unwrap_or(Scalar::Null))
                    .collect(),
            );
        }
        Ok(Self::new(columns, out))
    }
}

/// Strings that look like ISO dates or datetimes become temporal cells.
pub fn scalar_from_json(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => n.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
        },
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Scalar::Date(d)
            } else if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                Scalar::Datetime {
                    ts,
                    unit: TimeUnit::Microseconds,
                    tz: None,
                }
            } else {
                Scalar::Str(s.clone())
            }
        }
        other => Scalar::Other(other.to_string()),
    }
}

/// Inferred value-type tag for a sequence of cells.
pub fn infer_type_tag<'a>(cells: impl Iterator<Item = &'a Scalar>) -> &'static str {
    let mut tag: Option<&'static str> = None;
    for cell in cells {
        let this = match cell {
            Scalar::Null => continue,
            Scalar::Bool(_) => "boolean",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "floating",
            Scalar::Str(_) => "string",
            Scalar::Date(_) => "date",
            Scalar::Datetime { .. } => "datetime",
            Scalar::Time(_) => "time",
            Scalar::Other(_) => "mixed",
        };
        tag = Some(match (tag, this) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some("integer"), "floating") | (Some("floating"), "integer") => "floating",
            _ => return "mixed",
        });
    }
    tag.unwrap_or("empty")
}

impl TableBackend for RecordsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Records
    }

    fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn num_columns(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, column: usize) -> BackendResult<String> {
        check_column(column, self.columns.len())?;
        Ok(self.columns[column].clone())
    }

    fn column_type_name(&self, column: usize) -> BackendResult<String> {
        check_column(column, self.columns.len())?;
        Ok(OBJECT_TYPE_NAME.to_string())
    }

    fn column_type_display(&self, column: usize) -> BackendResult<ColumnDisplayType> {
        check_column(column, self.columns.len())?;
        Ok(ColumnDisplayType::Object)
    }

    fn infer_column_type(&self, column: usize) -> BackendResult<Option<String>> {
        check_column(column, self.columns.len())?;
        let tag = infer_type_tag(self.rows.iter().map(|row| &row[column]));
        Ok(Some(tag.to_string()))
    }

    fn gather(&self, column: usize, rows: Option<&[usize]>) -> BackendResult<Vec<Scalar>> {
        check_column(column, self.columns.len())?;
        Ok(match rows {
            None => self.rows.iter().map(|row| row[column].clone()).collect(),
            Some(rows) => rows
                .iter()
                .map(|&r| {
                    self.rows
                        .get(r)
                        .map(|row| row[column].clone())
                        .unwrap_or(Scalar::Null)
                })
                .collect(),
        })
    }

    fn has_row_labels(&self) -> bool {
        self.labels.is_some()
    }

    fn row_labels(&self, rows: &[usize]) -> BackendResult<Vec<String>> {
        let labels = self
            .labels
            .as_ref()
            .ok_or(BackendError::NotImplemented("row_labels"))?;
        Ok(rows
            .iter()
            .map(|&r| labels.get(r).cloned().unwrap_or_default())
            .collect())
    }
}
