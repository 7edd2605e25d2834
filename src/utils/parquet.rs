//! Table ↔ Parquet conversion and file inspection.
//!
//! Each column is written with the narrowest Arrow type that holds all of its non-null values
//! (`Int64`, `Float64`, `Boolean`, microsecond `Timestamp`, else `Utf8`). Table attributes ride
//! along as JSON in the Arrow schema metadata, so [`ParquetConverter::parquet_to_table`] restores
//! them.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{XlsReaderError, XlsResult};
use crate::types::{Table, TableAttrs, Value};

/// Schema metadata key holding serialized [`TableAttrs`].
pub const ATTRS_METADATA_KEY: &str = "xls_reader.attrs";

/// File extension used for columnar output.
pub const PARQUET_EXTENSION: &str = "parquet";

/// Compression codec for written files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    /// No compression.
    Uncompressed,
    /// Snappy (default).
    #[default]
    Snappy,
    /// Gzip at the default level.
    Gzip,
    /// Zstandard at the default level.
    Zstd,
}

impl ParquetCompression {
    fn codec(self) -> Compression {
        match self {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(Default::default()),
            ParquetCompression::Zstd => Compression::ZSTD(Default::default()),
        }
    }
}

/// File-level facts reported by [`ParquetConverter::parquet_metadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParquetFileInfo {
    /// Total rows.
    pub num_rows: i64,
    /// Leaf columns.
    pub num_columns: usize,
    /// Row groups.
    pub num_row_groups: usize,
    /// Size on disk in bytes.
    pub file_size: u64,
    /// Leaf column names in order.
    pub columns: Vec<String>,
    /// Writer identification string, if recorded.
    pub created_by: Option<String>,
    /// Parquet format version.
    pub format_version: i32,
}

/// Per-column summary reported by [`ParquetConverter::parquet_schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    /// Column name.
    pub name: String,
    /// Arrow storage type as written.
    pub data_type: String,
    /// Null values.
    pub null_count: usize,
    /// Distinct non-null values.
    pub unique_count: usize,
}

/// Writes and reads tables as Parquet files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParquetConverter {
    compression: ParquetCompression,
    row_group_size: Option<usize>,
}

impl ParquetConverter {
    /// Converter using `compression`.
    pub fn new(compression: ParquetCompression) -> Self {
        Self {
            compression,
            row_group_size: None,
        }
    }

    /// Cap rows per row group.
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = Some(rows.max(1));
        self
    }

    /// Configured codec.
    pub fn compression(&self) -> ParquetCompression {
        self.compression
    }

    /// Write `table` to `path`, creating parent directories.
    pub fn table_to_parquet(&self, table: &Table, path: impl AsRef<Path>) -> XlsResult<PathBuf> {
        let path = path.as_ref();
        self.write_table(table, path).map_err(|e| XlsReaderError::ParquetConversion {
            message: "failed to write table".to_string(),
            path: path.to_path_buf(),
            source: Some(Box::new(e)),
        })?;
        debug!(path = %path.display(), rows = table.row_count(), "wrote parquet file");
        Ok(path.to_path_buf())
    }

    fn write_table(&self, table: &Table, path: &Path) -> XlsResult<()> {
        if table.columns.is_empty() {
            return Err(XlsReaderError::processing("table has no columns"));
        }

        let mut fields = Vec::with_capacity(table.column_count());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.column_count());
        for (idx, name) in table.columns.iter().enumerate() {
            let values: Vec<&Value> = table.column_values(idx).collect();
            let array = column_to_array(&values);
            fields.push(Field::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        let attrs = serde_json::to_string(&table.attrs).map_err(|e| XlsReaderError::processing(e.to_string()))?;
        let metadata = HashMap::from([(ATTRS_METADATA_KEY.to_string(), attrs)]);
        let schema = Arc::new(Schema::new_with_metadata(fields, metadata));
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut props = WriterProperties::builder().set_compression(self.compression.codec());
        if let Some(rows) = self.row_group_size {
            props = props.set_max_row_group_size(rows);
        }

        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(props.build()))?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }

    /// Read a Parquet file back into a table.
    pub fn parquet_to_table(&self, path: impl AsRef<Path>) -> XlsResult<Table> {
        let path = path.as_ref();
        read_table(path).map_err(|e| XlsReaderError::ParquetConversion {
            message: "failed to read table".to_string(),
            path: path.to_path_buf(),
            source: Some(Box::new(e)),
        })
    }

    /// Write each table to `<dir>/<prefix>_<i>.parquet`.
    ///
    /// Stops at the first table that fails; files already written are left in place.
    pub fn tables_to_parquet_batch(
        &self,
        tables: &[Table],
        dir: impl AsRef<Path>,
        prefix: &str,
    ) -> XlsResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut files = Vec::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            let path = dir.join(format!("{prefix}_{i}.{PARQUET_EXTENSION}"));
            files.push(self.table_to_parquet(table, &path)?);
        }
        info!(dir = %dir.display(), files = files.len(), "wrote parquet batch");
        Ok(files)
    }

    /// File-level metadata without decoding data pages.
    pub fn parquet_metadata(&self, path: impl AsRef<Path>) -> XlsResult<ParquetFileInfo> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(XlsReaderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let reader = SerializedFileReader::try_from(path)?;
        let meta = reader.metadata();
        let file_meta = meta.file_metadata();
        let columns = file_meta
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.path().string())
            .collect::<Vec<_>>();
        Ok(ParquetFileInfo {
            num_rows: file_meta.num_rows(),
            num_columns: columns.len(),
            num_row_groups: meta.num_row_groups(),
            file_size: fs::metadata(path)?.len(),
            columns,
            created_by: file_meta.created_by().map(str::to_string),
            format_version: file_meta.version(),
        })
    }

    /// `true` when the file reads back with at least one row and one non-null value.
    pub fn validate_parquet_file(&self, path: impl AsRef<Path>) -> bool {
        match self.parquet_to_table(path) {
            Ok(table) => table.rows.iter().any(|row| row.iter().any(|v| !v.is_null())),
            Err(_) => false,
        }
    }

    /// Rewrite `input` to `output` with this converter's codec and `row_group_size`.
    pub fn optimize_parquet_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        row_group_size: usize,
    ) -> XlsResult<PathBuf> {
        let table = self.parquet_to_table(input)?;
        self.with_row_group_size(row_group_size)
            .table_to_parquet(&table, output)
    }

    /// Concatenate files by column name into `output`. Columns missing from a file are null for
    /// its rows; attributes come from the first file.
    pub fn merge_parquet_files(&self, inputs: &[PathBuf], output: impl AsRef<Path>) -> XlsResult<PathBuf> {
        let output = output.as_ref();
        if inputs.is_empty() {
            return Err(XlsReaderError::ParquetConversion {
                message: "no input files to merge".to_string(),
                path: output.to_path_buf(),
                source: None,
            });
        }

        let tables = inputs
            .iter()
            .map(|p| self.parquet_to_table(p))
            .collect::<XlsResult<Vec<_>>>()?;

        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for t in &tables {
            let mapping: Vec<Option<usize>> = columns.iter().map(|c| t.index_of(c)).collect();
            for row in &t.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|m| m.map(|i| row[i].clone()).unwrap_or(Value::Null))
                        .collect(),
                );
            }
        }

        let attrs = tables.first().map(|t| t.attrs.clone()).unwrap_or_default();
        self.table_to_parquet(&Table::new(columns, rows, attrs), output)
    }

    /// Storage type, null count, and distinct count per column.
    pub fn parquet_schema(&self, path: impl AsRef<Path>) -> XlsResult<Vec<ColumnSummary>> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let types: Vec<String> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| f.data_type().to_string())
            .collect();
        let table = self.parquet_to_table(path)?;

        Ok(table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mut distinct = BTreeSet::new();
                let mut nulls = 0;
                for v in table.column_values(idx) {
                    if v.is_null() {
                        nulls += 1;
                    } else {
                        distinct.insert(format!("{v:?}"));
                    }
                }
                ColumnSummary {
                    name: name.clone(),
                    data_type: types.get(idx).cloned().unwrap_or_default(),
                    null_count: nulls,
                    unique_count: distinct.len(),
                }
            })
            .collect())
    }
}

fn column_to_array(values: &[&Value]) -> ArrayRef {
    let non_null = || values.iter().filter(|v| !v.is_null());

    if non_null().all(|v| matches!(v, Value::Int64(_))) && non_null().next().is_some() {
        let data: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::Int64(i) => Some(*i),
                _ => None,
            })
            .collect();
        return Arc::new(Int64Array::from(data));
    }
    if non_null().all(|v| v.as_f64().is_some()) && non_null().next().is_some() {
        let data: Vec<Option<f64>> = values.iter().map(|v| v.as_f64()).collect();
        return Arc::new(Float64Array::from(data));
    }
    if non_null().all(|v| matches!(v, Value::Bool(_))) && non_null().next().is_some() {
        let data: Vec<Option<bool>> = values
            .iter()
            .map(|v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return Arc::new(BooleanArray::from(data));
    }
    if non_null().all(|v| matches!(v, Value::DateTime(_))) && non_null().next().is_some() {
        let data: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Value::DateTime(dt) => Some(dt.and_utc().timestamp_micros()),
                _ => None,
            })
            .collect();
        return Arc::new(TimestampMicrosecondArray::from(data));
    }

    let data: Vec<Option<String>> = values
        .iter()
        .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
        .collect();
    Arc::new(StringArray::from(data))
}

fn read_table(path: &Path) -> XlsResult<Table> {
    if !path.exists() {
        return Err(XlsReaderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let attrs: TableAttrs = schema
        .metadata()
        .get(ATTRS_METADATA_KEY)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for batch in reader {
        let batch = batch?;
        let decoded = batch
            .columns()
            .iter()
            .map(|array| array_to_values(array))
            .collect::<XlsResult<Vec<_>>>()?;
        for r in 0..batch.num_rows() {
            rows.push(decoded.iter().map(|col| col[r].clone()).collect());
        }
    }

    Ok(Table::new(columns, rows, attrs))
}

fn array_to_values(array: &ArrayRef) -> XlsResult<Vec<Value>> {
    let len = array.len();
    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; len],
        DataType::Boolean => {
            let a = array.as_boolean();
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Bool(a.value(i)) })
                .collect()
        }
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let casted = cast(array, &DataType::Int64)?;
            let a = casted.as_primitive::<Int64Type>();
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Int64(a.value(i)) })
                .collect()
        }
        DataType::UInt64 | DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _) => {
            let casted = cast(array, &DataType::Float64)?;
            let a = casted.as_primitive::<Float64Type>();
            (0..len)
                .map(|i| if a.is_null(i) { Value::Null } else { Value::Float64(a.value(i)) })
                .collect()
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            let casted = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            let a = casted.as_primitive::<TimestampMicrosecondType>();
            (0..len)
                .map(|i| {
                    if a.is_null(i) {
                        return Value::Null;
                    }
                    DateTime::from_timestamp_micros(a.value(i))
                        .map(|dt| Value::DateTime(dt.naive_utc()))
                        .unwrap_or(Value::Null)
                })
                .collect()
        }
        _ => {
            let casted = cast(array, &DataType::Utf8)?;
            let a = casted.as_string::<i32>();
            (0..len)
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::Utf8(a.value(i).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    use chrono::NaiveDate;

    fn tmp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("xls-reader-{name}-{nanos}.parquet"))
    }

    fn mixed_table() -> Table {
        let dt = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap().and_hms_opt(8, 30, 0).unwrap();
        Table::new(
            vec!["id".into(), "price".into(), "ok".into(), "when".into(), "note".into()],
            vec![
                vec![
                    Value::Int64(1),
                    Value::Float64(9.5),
                    Value::Bool(true),
                    Value::DateTime(dt),
                    Value::Utf8("a".into()),
                ],
                vec![
                    Value::Int64(2),
                    Value::Int64(3),
                    Value::Null,
                    Value::Null,
                    Value::Float64(4.0),
                ],
            ],
            TableAttrs::for_sheet("Sheet1", "book.xlsx").with_data_type("materials"),
        )
    }

    #[test]
    fn round_trip_keeps_types_and_attrs() {
        let path = tmp_path("roundtrip");
        let conv = ParquetConverter::default();
        let table = mixed_table();
        conv.table_to_parquet(&table, &path).unwrap();

        let back = conv.parquet_to_table(&path).unwrap();
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.row_count(), 2);
        assert_eq!(back.attrs, table.attrs);
        assert_eq!(back.rows[0][0], Value::Int64(1));
        assert_eq!(back.rows[1][1], Value::Float64(3.0));
        assert_eq!(back.rows[0][3], table.rows[0][3]);
        assert_eq!(back.rows[1][4], Value::Utf8("4".into()));

        let info = conv.parquet_metadata(&path).unwrap();
        assert_eq!(info.num_rows, 2);
        assert_eq!(info.num_columns, 5);
        assert!(info.file_size > 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn validate_rejects_missing_and_all_null_files() {
        let conv = ParquetConverter::new(ParquetCompression::Zstd);
        assert!(!conv.validate_parquet_file(tmp_path("missing")));

        let path = tmp_path("nulls");
        let t = Table::new(vec!["x".into()], vec![vec![Value::Null]], TableAttrs::default());
        conv.table_to_parquet(&t, &path).unwrap();
        assert!(!conv.validate_parquet_file(&path));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn writing_a_table_without_columns_fails() {
        let conv = ParquetConverter::default();
        let path = tmp_path("nocols");
        let err = conv
            .table_to_parquet(&Table::new(vec![], vec![], TableAttrs::default()), &path)
            .unwrap_err();
        assert!(matches!(err, XlsReaderError::ParquetConversion { .. }));
    }

    #[test]
    fn merge_unions_columns_and_schema_counts_values() {
        let conv = ParquetConverter::new(ParquetCompression::Gzip);
        let a = tmp_path("merge-a");
        let b = tmp_path("merge-b");
        let out = tmp_path("merge-out");
        conv.table_to_parquet(
            &Table::new(vec!["k".into()], vec![vec![Value::Int64(1)], vec![Value::Int64(1)]], TableAttrs::default()),
            &a,
        )
        .unwrap();
        conv.table_to_parquet(
            &Table::new(
                vec!["k".into(), "v".into()],
                vec![vec![Value::Int64(2), Value::Utf8("x".into())]],
                TableAttrs::default(),
            ),
            &b,
        )
        .unwrap();

        conv.merge_parquet_files(&[a.clone(), b.clone()], &out).unwrap();
        let merged = conv.parquet_to_table(&out).unwrap();
        assert_eq!(merged.columns, vec!["k", "v"]);
        assert_eq!(merged.row_count(), 3);

        let schema = conv.parquet_schema(&out).unwrap();
        assert_eq!(schema[0].unique_count, 2);
        assert_eq!(schema[1].null_count, 2);

        for p in [a, b, out] {
            let _ = fs::remove_file(p);
        }
    }
}
