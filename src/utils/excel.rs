//! Workbook access and cell-grid helpers.
//!
//! Sheets are loaded as a raw [`Grid`] anchored at `A1` (no header assumption), so row/column
//! indices reported by readers match the worksheet. Tables are cut out of a grid with
//! [`read_with_header`] or built cell by cell by the template readers.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{Data, Reader, Sheets, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{XlsReaderError, XlsResult};
use crate::types::{ColumnType, SchemaDescriptor, Table, TableAttrs, Value};

/// Extensions recognized as spreadsheets (compared case-insensitively).
pub const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Values sniffed per column by [`detect_column_types`].
pub const TYPE_SAMPLE_SIZE: usize = 100;

/// An open workbook of any supported container.
pub type Workbook = Sheets<BufReader<File>>;

/// Returns `true` when the path has a spreadsheet extension. Never touches the filesystem.
pub fn is_spreadsheet_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SPREADSHEET_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Check that `path` exists and carries a spreadsheet extension.
pub fn validate_excel_file(path: &Path) -> XlsResult<()> {
    if !path.exists() {
        return Err(XlsReaderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !is_spreadsheet_path(path) {
        return Err(XlsReaderError::InvalidFormat {
            path: path.to_path_buf(),
            expected: SPREADSHEET_EXTENSIONS.join("/"),
        });
    }
    Ok(())
}

/// Validate and open a workbook.
pub fn open_workbook(path: &Path) -> XlsResult<Workbook> {
    validate_excel_file(path)?;
    Ok(open_workbook_auto(path)?)
}

/// Sheet names in workbook order.
pub fn sheet_names(path: &Path) -> XlsResult<Vec<String>> {
    let workbook = open_workbook(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Extent of one worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    /// Sheet name.
    pub name: String,
    /// Rows from `A1` to the last used row.
    pub rows: usize,
    /// Columns from `A1` to the last used column.
    pub columns: usize,
}

/// Name and extent of every sheet.
pub fn sheet_info(path: &Path) -> XlsResult<Vec<SheetInfo>> {
    let mut workbook = open_workbook(path)?;
    let names = workbook.sheet_names().to_vec();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let grid = load_grid(&mut workbook, &name)?;
        out.push(SheetInfo {
            rows: grid.height(),
            columns: grid.width(),
            name,
        });
    }
    Ok(out)
}

/// A sheet's cells at their worksheet positions; `cells[r][c]` is row `r`, column `c`, both
/// 0-based from `A1`. Rows are padded to a common width.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    /// Sheet the cells came from.
    pub sheet: String,
    cells: Vec<Vec<Value>>,
    width: usize,
}

impl Grid {
    /// Build a grid from row-major cells, padding rows to the widest one.
    pub fn new(sheet: impl Into<String>, mut cells: Vec<Vec<Value>>) -> Self {
        let width = cells.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut cells {
            row.resize(width, Value::Null);
        }
        Self {
            sheet: sheet.into(),
            cells,
            width,
        }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.cells.len()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Cell at `(row, col)`; out-of-range positions read as [`Value::Null`].
    pub fn get(&self, row: usize, col: usize) -> &Value {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Value::Null)
    }

    /// Text content of a cell, if it holds a string.
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.get(row, col).as_str()
    }

    /// One row of cells (empty slice past the end).
    pub fn row(&self, row: usize) -> &[Value] {
        self.cells.get(row).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.cells.iter().map(Vec::as_slice)
    }
}

/// Load one sheet as a raw grid.
pub fn load_grid(workbook: &mut Workbook, sheet: &str) -> XlsResult<Grid> {
    let range = workbook.worksheet_range(sheet)?;
    let (row0, col0) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut cells: Vec<Vec<Value>> = vec![Vec::new(); row0];
    for row in range.rows() {
        let mut out = vec![Value::Null; col0];
        out.extend(row.iter().map(convert_cell));
        cells.push(out);
    }
    // Trailing all-empty rows from a sparse range are not part of the sheet.
    while cells.last().is_some_and(|r| r.iter().all(Value::is_null)) {
        cells.pop();
    }
    Ok(Grid::new(sheet, cells))
}

/// Convert a workbook cell into a [`Value`].
///
/// Empty (or whitespace-only) strings and error cells become [`Value::Null`].
pub fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Utf8(s.clone()),
        Data::Int(i) => Value::Int64(*i),
        Data::Float(f) => Value::Float64(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => {
            if dt.is_duration() {
                Value::Float64(dt.as_f64())
            } else {
                // Epoch (1900 or 1904) travels with the cell.
                dt.as_datetime()
                    .map(Value::DateTime)
                    .unwrap_or(Value::Float64(dt.as_f64()))
            }
        }
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Value::DateTime)
            .unwrap_or_else(|| Value::Utf8(s.clone())),
        Data::DurationIso(s) => Value::Utf8(s.clone()),
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Render a cell for use as a column name; whole floats drop their `.0`.
pub fn cell_to_header_string(v: &Value) -> String {
    match v {
        Value::Float64(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        Value::Utf8(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// First row within `max_rows` holding a text cell that contains any of `keywords`
/// (case-insensitive, partial match).
pub fn find_header_row(grid: &Grid, keywords: &[&str], max_rows: usize) -> Option<usize> {
    let wanted: Vec<String> = keywords.iter().map(|k| k.to_uppercase()).collect();
    grid.rows().take(max_rows).position(|row| {
        row.iter().filter_map(Value::as_str).any(|text| {
            let text = text.to_uppercase();
            wanted.iter().any(|k| text.contains(k.as_str()))
        })
    })
}

/// Cut a table out of a grid: row `header_row` names the columns, every later row not listed in
/// `skip_rows` (absolute indices) becomes data.
///
/// Blank header cells become `Unnamed: <i>`; repeated names get `.1`, `.2`, ... suffixes.
pub fn read_with_header(grid: &Grid, header_row: usize, skip_rows: &[usize], attrs: TableAttrs) -> Table {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let columns: Vec<String> = (0..grid.width())
        .map(|c| {
            let raw = cell_to_header_string(grid.get(header_row, c));
            let base = if raw.is_empty() { format!("Unnamed: {c}") } else { raw };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 { base } else { format!("{base}.{n}") };
            *n += 1;
            name
        })
        .collect();

    let rows = (header_row + 1..grid.height())
        .filter(|r| !skip_rows.contains(r))
        .map(|r| grid.row(r).to_vec())
        .collect();

    Table::new(columns, rows, attrs)
}

/// Sub-grid covering rows `rows` and columns `cols` (half-open, clamped to the sheet).
pub fn extract_range(grid: &Grid, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Grid {
    let row_end = rows.end.min(grid.height());
    let col_end = cols.end.min(grid.width());
    let cells = (rows.start.min(row_end)..row_end)
        .map(|r| {
            (cols.start.min(col_end)..col_end)
                .map(|c| grid.get(r, c).clone())
                .collect()
        })
        .collect();
    Grid::new(grid.sheet.clone(), cells)
}

/// Drop rows whose cells are all null, then columns whose values are all null.
///
/// A table without rows keeps its columns.
pub fn clean_table(table: &Table) -> Table {
    let rows: Vec<Vec<Value>> = table
        .rows
        .iter()
        .filter(|row| !row.iter().all(Value::is_null))
        .cloned()
        .collect();
    if rows.is_empty() {
        return Table::new(table.columns.clone(), rows, table.attrs.clone());
    }

    let keep: Vec<usize> = (0..table.columns.len())
        .filter(|&c| rows.iter().any(|row| !row[c].is_null()))
        .collect();
    let columns = keep.iter().map(|&c| table.columns[c].clone()).collect();
    let rows = rows
        .into_iter()
        .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
        .collect();
    Table::new(columns, rows, table.attrs.clone())
}

/// Sniff each column's type from up to [`TYPE_SAMPLE_SIZE`] non-null values.
///
/// Text that parses as a number counts as numeric; mixed columns are strings.
pub fn detect_column_types(table: &Table) -> BTreeMap<String, ColumnType> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let sample: Vec<&Value> = table
                .column_values(idx)
                .filter(|v| !v.is_null())
                .take(TYPE_SAMPLE_SIZE)
                .collect();
            (name.clone(), classify(&sample))
        })
        .collect()
}

fn classify(sample: &[&Value]) -> ColumnType {
    if sample.is_empty() {
        return ColumnType::Empty;
    }
    if sample.iter().all(|v| numeric_value(v).is_some()) {
        ColumnType::Numeric
    } else if sample.iter().all(|v| matches!(v, Value::DateTime(_))) {
        ColumnType::Datetime
    } else if sample.iter().all(|v| matches!(v, Value::Bool(_))) {
        ColumnType::Boolean
    } else {
        ColumnType::String
    }
}

fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Utf8(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    }
}

/// Compare a table against a reader schema and describe every mismatch.
///
/// Returns an error only when a `min`/`max` constraint targets a column with non-numeric values;
/// callers report that as a single warning.
pub fn validate_table_schema(table: &Table, schema: &SchemaDescriptor) -> XlsResult<Vec<String>> {
    let mut warnings = Vec::new();

    let missing: Vec<&str> = schema
        .required_columns
        .iter()
        .filter(|c| table.index_of(c).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        warnings.push(format!("Missing required columns: {missing:?}"));
    }

    if !schema.column_types.is_empty() {
        let detected = detect_column_types(table);
        for (column, expected) in &schema.column_types {
            match detected.get(column) {
                Some(found) if found != expected && *found != ColumnType::Empty => {
                    warnings.push(format!("Column '{column}' expected {expected}, found {found}"));
                }
                _ => {}
            }
        }
    }

    for (column, constraint) in &schema.constraints {
        let Some(idx) = table.index_of(column) else {
            continue;
        };
        let values: Vec<&Value> = table.column_values(idx).filter(|v| !v.is_null()).collect();

        if constraint.min.is_some() || constraint.max.is_some() {
            let numbers = values
                .iter()
                .map(|v| numeric_value(v))
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| XlsReaderError::DataProcessing {
                    message: format!("min/max constraint on non-numeric column '{column}'"),
                    sheet: table.attrs.sheet_name.clone(),
                    row: None,
                    source: None,
                })?;
            if let Some(min) = constraint.min {
                let below = numbers.iter().filter(|&&n| n < min).count();
                if below > 0 {
                    warnings.push(format!("Column '{column}' has {below} values below minimum {min}"));
                }
            }
            if let Some(max) = constraint.max {
                let above = numbers.iter().filter(|&&n| n > max).count();
                if above > 0 {
                    warnings.push(format!("Column '{column}' has {above} values above maximum {max}"));
                }
            }
        }

        if constraint.unique {
            let mut seen = BTreeSet::new();
            let duplicates = values.iter().filter(|v| !seen.insert(format!("{v:?}"))).count();
            if duplicates > 0 {
                warnings.push(format!("Column '{column}' has {duplicates} duplicate values"));
            }
        }
    }

    Ok(warnings)
}
