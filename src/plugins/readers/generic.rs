//! Fallback reader: one table per sheet, headed by a configurable row.

use std::path::Path;

use calamine::Reader;

use serde_json::json;
use tracing::{info, warn};

use crate::config::ReaderConfig;
use crate::error::{XlsReaderError, XlsResult};
use crate::plugins::registry::PluginProvider;
use crate::plugins::{Plugin, PluginKind, PluginMetadata, ReaderPlugin};
use crate::types::{SchemaDescriptor, Table, TableAttrs};
use crate::utils::excel::{self, clean_table, read_with_header};

/// Reads every (or every configured) sheet as a plain table.
///
/// Row `header_row` names the columns; rows listed in `skip_rows` are dropped; with
/// `clean_data`, fully empty rows and columns are stripped. Blank sheets produce no table.
/// Handles any spreadsheet extension, so it belongs at the end of the selection order.
#[derive(Debug)]
pub struct GenericExcelReader {
    meta: PluginMetadata,
}

impl Default for GenericExcelReader {
    fn default() -> Self {
        Self {
            meta: PluginMetadata {
                name: "GenericExcelReader".to_string(),
                version: "1.0.0".to_string(),
                description: "Generic spreadsheet reader: one table per sheet".to_string(),
                author: super::templates::AUTHOR.to_string(),
                kind: PluginKind::Reader,
                supported_formats: excel::SPREADSHEET_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                configuration_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "sheet_names": {"type": "array"},
                        "header_row": {"type": "integer", "default": 0},
                        "skip_rows": {"type": "array"},
                        "clean_data": {"type": "boolean", "default": true}
                    }
                })),
            },
        }
    }
}

impl Plugin for GenericExcelReader {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }
}

impl ReaderPlugin for GenericExcelReader {
    fn can_handle(&self, path: &Path) -> bool {
        excel::is_spreadsheet_path(path)
    }

    fn read(&self, path: &Path, config: &ReaderConfig) -> XlsResult<Vec<Table>> {
        let mut workbook = excel::open_workbook(path)?;
        let sheets = if config.sheet_names.is_empty() {
            workbook.sheet_names().to_vec()
        } else {
            config.sheet_names.clone()
        };

        let mut tables = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let grid = match excel::load_grid(&mut workbook, &sheet) {
                Ok(grid) => grid,
                Err(e) => {
                    warn!(sheet = %sheet, error = %e, "failed to read sheet");
                    continue;
                }
            };
            if grid.width() == 0 {
                warn!(sheet = %sheet, "skipping blank sheet");
                continue;
            }
            let attrs = TableAttrs::for_sheet(sheet.clone(), path);
            let mut table = read_with_header(&grid, config.header_row, &config.skip_rows, attrs);
            if config.clean_data {
                table = clean_table(&table);
            }
            info!(sheet = %sheet, rows = table.row_count(), columns = table.column_count(), "read sheet");
            tables.push(table);
        }

        if tables.is_empty() {
            return Err(XlsReaderError::DataProcessing {
                message: format!("no sheets were read from {}", path.display()),
                sheet: None,
                row: None,
                source: None,
            });
        }
        Ok(tables)
    }

    fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor::default()
    }
}

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::reader::<GenericExcelReader>("plugins/readers/generic")
}
