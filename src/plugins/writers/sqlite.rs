//! SQLite target.

use std::fs;
use std::path::PathBuf;

use rusqlite::{Connection, OpenFlags, Transaction, params, params_from_iter};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{column_sql_type, resolve_table_names, to_sql_value, unique_column_names};
use crate::config::{DatabaseWriteConfig, IfExists};
use crate::error::{XlsReaderError, XlsResult};
use crate::plugins::registry::PluginProvider;
use crate::plugins::{Plugin, PluginKind, PluginMetadata, WriterPlugin};
use crate::types::Table;

const DATABASE: &str = "sqlite";
const FILE_SUFFIXES: [&str; 3] = [".db", ".sqlite", ".sqlite3"];
/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` since 3.32.
const MAX_BOUND_PARAMS: usize = 32_766;

/// Declared column and row count of an existing relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// `(name, declared type)` in column order.
    pub columns: Vec<(String, String)>,
    /// Rows currently stored.
    pub row_count: usize,
}

/// Writes tables into a SQLite database file, one relation per table, in a single
/// transaction.
#[derive(Debug)]
pub struct SQLiteWriter {
    meta: PluginMetadata,
}

impl Default for SQLiteWriter {
    fn default() -> Self {
        Self {
            meta: PluginMetadata {
                name: "SQLiteWriter".to_string(),
                version: "1.0.0".to_string(),
                description: "SQLite database writer".to_string(),
                author: crate::plugins::readers::templates::AUTHOR.to_string(),
                kind: PluginKind::Writer,
                supported_formats: vec!["sqlite".to_string(), "db".to_string()],
                configuration_schema: Some(json!({
                    "type": "object",
                    "properties": {
                        "batch_size": {"type": "integer", "default": crate::config::DEFAULT_BATCH_SIZE},
                        "if_exists": {"type": "string", "enum": ["fail", "replace", "append"], "default": "replace"}
                    }
                })),
            },
        }
    }
}

/// Filesystem path named by a connection string.
///
/// Strips `sqlite:///`, `sqlite://` or `sqlite:`; bare paths without a recognized suffix get
/// `.db` appended.
pub fn database_path(connection_string: &str) -> PathBuf {
    let cs = connection_string.trim();
    for scheme in ["sqlite:///", "sqlite://", "sqlite:"] {
        if let Some(rest) = cs.strip_prefix(scheme) {
            return PathBuf::from(rest);
        }
    }
    let lower = cs.to_ascii_lowercase();
    if FILE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
        PathBuf::from(cs)
    } else {
        PathBuf::from(format!("{cs}.db"))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SQLiteWriter {
    fn open(&self, connection_string: &str) -> XlsResult<Connection> {
        let path = database_path(connection_string);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Connection::open(&path).map_err(|source| XlsReaderError::Connection {
            database: DATABASE.to_string(),
            connection_string: connection_string.to_string(),
            source,
        })
    }

    /// Create one single-column index per entry of `columns` on `table`.
    pub fn create_indexes(&self, connection_string: &str, table: &str, columns: &[String]) -> XlsResult<()> {
        let conn = self.open(connection_string)?;
        for column in columns {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&format!("idx_{table}_{column}")),
                quote_ident(table),
                quote_ident(column)
            );
            conn.execute(&sql, []).map_err(|e| write_error(table, e))?;
            debug!(table, column = %column, "created index");
        }
        Ok(())
    }

    /// Column declarations and row count of `table`.
    pub fn table_info(&self, connection_string: &str, table: &str) -> XlsResult<TableInfo> {
        let conn = self.open(connection_string)?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(XlsReaderError::Write {
                database: DATABASE.to_string(),
                table: table.to_string(),
                message: "no such table".to_string(),
            });
        }
        let row_count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), [], |r| r.get(0))?;
        Ok(TableInfo {
            columns,
            row_count: usize::try_from(row_count).unwrap_or_default(),
        })
    }
}

fn write_error(table: &str, e: impl std::fmt::Display) -> XlsReaderError {
    XlsReaderError::Write {
        database: DATABASE.to_string(),
        table: table.to_string(),
        message: e.to_string(),
    }
}

fn table_exists(tx: &Transaction<'_>, name: &str) -> rusqlite::Result<bool> {
    tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![name],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
}

fn write_table(
    tx: &Transaction<'_>,
    table: &Table,
    name: &str,
    if_exists: IfExists,
    batch_size: usize,
) -> XlsResult<usize> {
    let exists = table_exists(tx, name).map_err(|e| write_error(name, e))?;
    match (exists, if_exists) {
        (true, IfExists::Fail) => return Err(write_error(name, "table already exists")),
        (true, IfExists::Replace) => {
            tx.execute(&format!("DROP TABLE {}", quote_ident(name)), [])
                .map_err(|e| write_error(name, e))?;
        }
        _ => {}
    }

    let columns = unique_column_names(&table.columns);
    let decls: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} {}", quote_ident(c), column_sql_type(table, i).as_sql()))
        .collect();
    tx.execute(
        &format!("CREATE TABLE IF NOT EXISTS {} ({})", quote_ident(name), decls.join(", ")),
        [],
    )
    .map_err(|e| write_error(name, e))?;

    let width = columns.len();
    let rows_per_stmt = batch_size.min(MAX_BOUND_PARAMS / width).max(1);
    let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let placeholder = format!("({})", vec!["?"; width].join(", "));

    for chunk in table.rows.chunks(rows_per_stmt) {
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES {}",
            quote_ident(name),
            vec![placeholder.as_str(); chunk.len()].join(", ")
        );
        let values = chunk.iter().flatten().map(to_sql_value);
        tx.execute(&sql, params_from_iter(values))
            .map_err(|e| write_error(name, e))?;
    }
    Ok(table.row_count())
}

impl Plugin for SQLiteWriter {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }
}

impl WriterPlugin for SQLiteWriter {
    fn can_handle(&self, connection_string: &str) -> bool {
        let lower = connection_string.trim().to_ascii_lowercase();
        lower.starts_with("sqlite:") || FILE_SUFFIXES.iter().any(|s| lower.ends_with(s))
    }

    fn write(&self, tables: &[Table], config: &DatabaseWriteConfig) -> XlsResult<bool> {
        let mut conn = self.open(&config.connection_string)?;
        let tx = conn.transaction()?;
        let if_exists = config.effective_if_exists();
        let batch_size = config.effective_batch_size();

        for (table, name) in tables.iter().zip(resolve_table_names(tables, &config.table_names)) {
            if table.column_count() == 0 {
                warn!(table = %name, "skipping table without columns");
                continue;
            }
            let rows = write_table(&tx, table, &name, if_exists, batch_size)?;
            info!(table = %name, rows, %if_exists, "wrote table");
        }

        // An early return drops `tx`, which rolls back every relation written so far.
        tx.commit()?;
        Ok(true)
    }

    fn supported_targets(&self) -> Vec<String> {
        vec!["sqlite".to_string()]
    }

    /// Opens the target without `SQLITE_OPEN_CREATE`, so probing an absent database is `false`
    /// and leaves nothing behind.
    fn test_connection(&self, connection_string: &str) -> bool {
        match Connection::open_with_flags(database_path(connection_string), OpenFlags::SQLITE_OPEN_READ_WRITE) {
            Ok(conn) => conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0)).is_ok(),
            Err(e) => {
                debug!(connection_string, error = %e, "connection probe failed");
                false
            }
        }
    }
}

/// Discovery entry.
pub fn provider() -> PluginProvider {
    PluginProvider::writer::<SQLiteWriter>("plugins/writers/sqlite")
}
