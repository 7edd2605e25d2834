//! Core data model: extracted tables, cell values, schema descriptors and processing results.
//!
//! Readers produce [`Table`]s; the kernel validates them against a reader's
//! [`SchemaDescriptor`] and fans them out to columnar files and database writers, recording what
//! happened in a [`ProcessingResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Date and time without timezone (spreadsheets carry none).
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Text view of the value, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Utf8(s) => f.write_str(s),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Auxiliary attributes every extracted table carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttrs {
    /// Sheet the table was extracted from.
    pub sheet_name: Option<String>,
    /// Workbook the table was extracted from.
    pub source_file: Option<PathBuf>,
    /// Semantic category tag (e.g. `materials`, `dates`).
    pub data_type: Option<String>,
    /// Document template the table came from (e.g. `bom`, `sdm`).
    pub document_kind: Option<String>,
}

impl TableAttrs {
    /// Attributes for a table cut from `sheet` of `source_file`.
    pub fn for_sheet(sheet: impl Into<String>, source_file: impl Into<PathBuf>) -> Self {
        Self {
            sheet_name: Some(sheet.into()),
            source_file: Some(source_file.into()),
            ..Self::default()
        }
    }

    /// Builder-style setter for [`TableAttrs::data_type`].
    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Builder-style setter for [`TableAttrs::document_kind`].
    pub fn with_document_kind(mut self, kind: impl Into<String>) -> Self {
        self.document_kind = Some(kind.into());
        self
    }
}

/// In-memory extracted table.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as [`Table::columns`]; every row has
/// exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Ordered column names.
    pub columns: Vec<String>,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
    /// Origin attributes.
    pub attrs: TableAttrs,
}

impl Table {
    /// Create a table, padding short rows with [`Value::Null`] and truncating long ones so every
    /// row matches the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, attrs: TableAttrs) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows, attrs }
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the values of column `idx` top to bottom.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Copy of this table under new column names (same rows and attributes).
    pub fn with_columns(&self, columns: Vec<String>) -> Self {
        Self::new(columns, self.rows.clone(), self.attrs.clone())
    }
}

/// Type detected for a column by sniffing its non-null values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// No non-null values.
    Empty,
    /// Integers and/or floats.
    Numeric,
    /// Date/time values.
    Datetime,
    /// Booleans.
    Boolean,
    /// Anything else (including mixed columns).
    String,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Empty => "empty",
            ColumnType::Numeric => "numeric",
            ColumnType::Datetime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
        };
        f.write_str(s)
    }
}

/// Value constraints checked after extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConstraint {
    /// Smallest allowed numeric value.
    pub min: Option<f64>,
    /// Largest allowed numeric value.
    pub max: Option<f64>,
    /// Whether non-null values must be distinct.
    #[serde(default)]
    pub unique: bool,
}

/// What a reader expects its tables to look like.
///
/// Used for post-hoc warnings only; it never rejects data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Columns every table must contain.
    #[serde(default)]
    pub required_columns: Vec<String>,
    /// Expected type per column.
    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,
    /// Value constraints per column.
    #[serde(default)]
    pub constraints: BTreeMap<String, ColumnConstraint>,
    /// Categories (table `data_type` tags) the reader can emit.
    #[serde(default)]
    pub data_types: Vec<String>,
}

/// One output channel's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum OutputRecord {
    /// Columnar files written, one per table.
    Parquet {
        /// Written file paths, in table order.
        files: Vec<PathBuf>,
        /// Number of files.
        count: usize,
    },
    /// Database write summary.
    Database {
        /// Writer plugin used.
        writer: String,
        /// Writer-reported success.
        success: bool,
        /// Number of relations written.
        tables_written: usize,
    },
}

/// Aggregate outcome of processing one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// The processed file.
    pub file_path: PathBuf,
    /// Reader plugin that extracted the tables.
    pub reader_used: String,
    /// Number of extracted tables.
    pub tables_count: usize,
    /// Validation (and skipped-output) warnings.
    pub validation_warnings: Vec<String>,
    /// One record per requested output channel.
    pub outputs: Vec<OutputRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_normalizes_row_width() {
        let t = Table::new(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Int64(1)],
                vec![Value::Int64(2), Value::Int64(3), Value::Int64(4)],
            ],
            TableAttrs::default(),
        );
        assert_eq!(t.rows[0], vec![Value::Int64(1), Value::Null]);
        assert_eq!(t.rows[1], vec![Value::Int64(2), Value::Int64(3)]);
        assert_eq!(t.column_values(1).filter(|v| v.is_null()).count(), 1);
    }

    #[test]
    fn display_formats_datetimes_with_seconds() {
        let dt = NaiveDateTime::parse_from_str("2024-03-05 07:08:09", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(Value::DateTime(dt).to_string(), "2024-03-05 07:08:09");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn processing_result_serializes_output_records_with_format_tag() {
        let r = OutputRecord::Parquet {
            files: vec![PathBuf::from("out/a.parquet")],
            count: 1,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["format"], "parquet");
        assert_eq!(json["count"], 1);
    }
}
