//! Keyword-driven extraction shared by the template readers.
//!
//! A [`Template`] describes one document family: which file/sheet names identify it and which
//! categories of data to pull out of each sheet. Categories are either marker based (scan text
//! cells for keywords and collect values around each hit) or row based (find a header row and
//! take every non-empty row after it).
//!
//! Reported rows and columns are 1-based worksheet positions.

use std::path::Path;

use calamine::Reader;

use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::{XlsReaderError, XlsResult};
use crate::types::{SchemaDescriptor, Table, TableAttrs, Value};
use crate::utils::excel::{self, Grid, find_header_row};

/// Columns either side of a marker inspected by [`Scope::Neighbors`].
pub const NEIGHBOR_WINDOW: usize = 2;

/// Where values are read relative to a marker cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The marker cell itself is the value.
    Cell,
    /// Non-empty cells up to [`NEIGHBOR_WINDOW`] columns left and right on the same row.
    Neighbors,
    /// Every non-empty cell below the marker in the same column.
    Below,
}

/// How the label column of a marker row is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// The marker cell's text.
    CellText,
    /// A fixed tag.
    Fixed(&'static str),
}

/// One keyword set and what to do on a hit.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Uppercase keywords matched as substrings of uppercased cell text.
    pub keywords: &'static [&'static str],
    /// Value location.
    pub scope: Scope,
    /// Label column content.
    pub label: Label,
    /// Only scan this many leading rows.
    pub max_rows: Option<usize>,
}

impl Marker {
    /// Marker scanning the whole sheet.
    pub const fn new(keywords: &'static [&'static str], scope: Scope, label: Label) -> Self {
        Self {
            keywords,
            scope,
            label,
            max_rows: None,
        }
    }

    /// Restrict scanning to the first `rows` rows.
    pub const fn within_rows(mut self, rows: usize) -> Self {
        self.max_rows = Some(rows);
        self
    }

    fn hits(&self, text: &str) -> bool {
        let upper = text.to_uppercase();
        self.keywords.iter().any(|k| upper.contains(k))
    }
}

/// How a category's table is assembled.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// `{label, value, row, column}` records around marker hits. Within one cell, the first
    /// matching marker wins.
    Markers {
        /// Name of the label column.
        label_column: &'static str,
        /// Name of the value column.
        value_column: &'static str,
        /// Marker rules in priority order.
        markers: Vec<Marker>,
    },
    /// Non-empty rows after the first header row (within `search_rows`) containing a keyword;
    /// columns are named `col_<i>` by 0-based worksheet column.
    RowsAfterHeader {
        /// Header keywords.
        header_keywords: &'static [&'static str],
        /// Rows searched for the header.
        search_rows: usize,
    },
}

/// A named category and its extraction rule.
#[derive(Debug, Clone)]
pub struct Category {
    /// Tag written to [`TableAttrs::data_type`] and used as the config toggle key.
    pub name: &'static str,
    /// Rule.
    pub extraction: Extraction,
}

/// A document family recognized by name and extracted by category.
#[derive(Debug, Clone)]
pub struct Template {
    /// Tag written to [`TableAttrs::document_kind`].
    pub document_kind: &'static str,
    /// Uppercase keywords matched anywhere in the file path.
    pub file_keywords: &'static [&'static str],
    /// Uppercase keywords matched against sheet names.
    pub sheet_keywords: &'static [&'static str],
    /// Categories in output order.
    pub categories: Vec<Category>,
}

impl Template {
    /// Whether `path` looks like this document family. Never fails.
    pub fn matches(&self, path: &Path) -> bool {
        if !excel::is_spreadsheet_path(path) {
            return false;
        }
        let full_path = path.to_string_lossy().to_uppercase();
        if self.file_keywords.iter().any(|k| full_path.contains(k)) {
            return true;
        }
        match excel::sheet_names(path) {
            Ok(names) => names.iter().any(|name| {
                let name = name.to_uppercase();
                self.sheet_keywords.iter().any(|k| name.contains(k))
            }),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "sheet names unavailable");
                false
            }
        }
    }

    /// Schema listing the categories this template emits.
    pub fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            data_types: self.categories.iter().map(|c| c.name.to_string()).collect(),
            ..SchemaDescriptor::default()
        }
    }

    /// Extract every enabled category from every selected sheet.
    ///
    /// Sheets that fail to load are skipped with a warning; no tables at all is an error.
    pub fn read(&self, path: &Path, config: &ReaderConfig) -> XlsResult<Vec<Table>> {
        let mut workbook = excel::open_workbook(path)?;
        let sheets = if config.sheet_names.is_empty() {
            workbook.sheet_names().to_vec()
        } else {
            config.sheet_names.clone()
        };

        let mut tables = Vec::new();
        for sheet in sheets {
            let grid = match excel::load_grid(&mut workbook, &sheet) {
                Ok(grid) => grid,
                Err(e) => {
                    warn!(sheet = %sheet, error = %e, "failed to read sheet");
                    continue;
                }
            };
            for table in self.extract_sheet(&grid, path, config) {
                info!(
                    sheet = %sheet,
                    data_type = table.attrs.data_type.as_deref().unwrap_or_default(),
                    rows = table.row_count(),
                    "extracted {} data",
                    self.document_kind
                );
                tables.push(table);
            }
        }

        if tables.is_empty() {
            return Err(XlsReaderError::DataProcessing {
                message: format!(
                    "no {} data was extracted from {}",
                    self.document_kind,
                    path.display()
                ),
                sheet: None,
                row: None,
                source: None,
            });
        }
        Ok(tables)
    }

    /// Tables for every enabled, non-empty category of one sheet.
    pub fn extract_sheet(&self, grid: &Grid, source: &Path, config: &ReaderConfig) -> Vec<Table> {
        self.categories
            .iter()
            .filter(|c| config.category_enabled(c.name))
            .filter_map(|category| {
                let (columns, rows) = match &category.extraction {
                    Extraction::Markers {
                        label_column,
                        value_column,
                        markers,
                    } => marker_records(grid, label_column, value_column, markers),
                    Extraction::RowsAfterHeader {
                        header_keywords,
                        search_rows,
                    } => rows_after_header(grid, header_keywords, *search_rows),
                };
                if rows.is_empty() {
                    return None;
                }
                let attrs = TableAttrs::for_sheet(grid.sheet.clone(), source)
                    .with_data_type(category.name)
                    .with_document_kind(self.document_kind);
                Some(Table::new(columns, rows, attrs))
            })
            .collect()
    }
}

fn marker_records(
    grid: &Grid,
    label_column: &str,
    value_column: &str,
    markers: &[Marker],
) -> (Vec<String>, Vec<Vec<Value>>) {
    let columns = vec![
        label_column.to_string(),
        value_column.to_string(),
        "row".to_string(),
        "column".to_string(),
    ];
    let mut rows = Vec::new();

    for r in 0..grid.height() {
        for c in 0..grid.width() {
            let Some(text) = grid.text(r, c) else {
                continue;
            };
            let Some(marker) = markers
                .iter()
                .filter(|m| m.max_rows.is_none_or(|max| r < max))
                .find(|m| m.hits(text))
            else {
                continue;
            };

            let label = match marker.label {
                Label::CellText => text.to_string(),
                Label::Fixed(tag) => tag.to_string(),
            };
            for (vr, vc) in value_positions(grid, r, c, marker.scope) {
                let value = grid.get(vr, vc);
                if value.is_null() {
                    continue;
                }
                rows.push(vec![
                    Value::Utf8(label.clone()),
                    Value::Utf8(value.to_string()),
                    Value::Int64(vr as i64 + 1),
                    Value::Int64(vc as i64 + 1),
                ]);
            }
        }
    }
    (columns, rows)
}

fn value_positions(grid: &Grid, row: usize, col: usize, scope: Scope) -> Vec<(usize, usize)> {
    match scope {
        Scope::Cell => vec![(row, col)],
        Scope::Neighbors => {
            let start = col.saturating_sub(NEIGHBOR_WINDOW);
            let end = (col + NEIGHBOR_WINDOW).min(grid.width().saturating_sub(1));
            (start..=end)
                .filter(|&c| c != col)
                .map(|c| (row, c))
                .collect()
        }
        Scope::Below => (row + 1..grid.height()).map(|r| (r, col)).collect(),
    }
}

fn rows_after_header(
    grid: &Grid,
    header_keywords: &[&str],
    search_rows: usize,
) -> (Vec<String>, Vec<Vec<Value>>) {
    let Some(header) = find_header_row(grid, header_keywords, search_rows) else {
        return (Vec::new(), Vec::new());
    };

    let used: Vec<usize> = (0..grid.width())
        .filter(|&c| (header + 1..grid.height()).any(|r| !grid.get(r, c).is_null()))
        .collect();
    let columns = used.iter().map(|c| format!("col_{c}")).collect();
    let rows = (header + 1..grid.height())
        .filter(|&r| grid.row(r).iter().any(|v| !v.is_null()))
        .map(|r| used.iter().map(|&c| grid.get(r, c).clone()).collect())
        .collect();
    (columns, rows)
}
