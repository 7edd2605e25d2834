use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::plugins::PluginKind;

/// Convenience result type used across the crate.
pub type XlsResult<T> = Result<T, XlsReaderError>;

/// Coarse grouping of [`XlsReaderError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Plugin lookup, loading, or metadata validation.
    Plugin,
    /// File access, format detection, extraction, and conversion.
    Processing,
    /// Database connections and writes.
    Database,
    /// Configuration documents and caller-supplied options.
    Configuration,
}

/// Error type returned by readers, writers, the registry, and the kernel.
///
/// Every variant carries enough structured data to rebuild a diagnostic context map via
/// [`XlsReaderError::context`].
#[derive(Debug, Error)]
pub enum XlsReaderError {
    /// No registered plugin accepts the input (file path or connection string).
    #[error("{message} (available {kind}s: {available:?})")]
    PluginNotFound {
        message: String,
        kind: PluginKind,
        available: Vec<String>,
    },

    /// A plugin could not be constructed or registered.
    #[error("failed to load plugin '{plugin}': {message}")]
    PluginLoad { plugin: String, message: String },

    /// Plugin metadata failed validation.
    #[error("plugin '{plugin}' failed validation: {}", errors.join("; "))]
    PluginValidation { plugin: String, errors: Vec<String> },

    /// The input file does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// The input exists but is not a recognized spreadsheet (or columnar) file.
    #[error("invalid format for {}: expected {expected}", path.display())]
    InvalidFormat { path: PathBuf, expected: String },

    /// Extraction or post-processing failed.
    #[error("data processing failed: {message}")]
    DataProcessing {
        message: String,
        sheet: Option<String>,
        row: Option<usize>,
        #[source]
        source: Option<Box<XlsReaderError>>,
    },

    /// Conversion to or from the columnar format failed.
    #[error("parquet conversion failed for {}: {message}", path.display())]
    ParquetConversion {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<Box<XlsReaderError>>,
    },

    /// A database target could not be opened.
    #[error("cannot connect to {database} database '{connection_string}': {source}")]
    Connection {
        database: String,
        connection_string: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Writing an individual relation failed.
    #[error("failed to write table '{table}' to {database}: {message}")]
    Write {
        database: String,
        table: String,
        message: String,
    },

    /// The database output step failed as a whole.
    #[error("database output failed: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<XlsReaderError>>,
    },

    /// A configuration document is missing, malformed, or violates its schema.
    #[error("invalid configuration{}: {}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default(), errors.join("; "))]
    Configuration {
        path: Option<PathBuf>,
        errors: Vec<String>,
    },

    /// An output mode outside `parquet`/`columnar`, `database`, `both`.
    #[error("invalid output mode '{mode}' (expected one of: parquet, columnar, database, both)")]
    InvalidOutputMode { mode: String },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook parsing error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Parquet encoding/decoding error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Arrow array or schema error.
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// SQLite error outside of connection setup.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl XlsReaderError {
    /// Shorthand for a [`XlsReaderError::DataProcessing`] without sheet/row/source.
    pub fn processing(message: impl Into<String>) -> Self {
        Self::DataProcessing {
            message: message.into(),
            sheet: None,
            row: None,
            source: None,
        }
    }

    /// Shorthand for a single-message [`XlsReaderError::Configuration`].
    pub fn config(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path,
            errors: vec![message.into()],
        }
    }

    /// The taxonomy group this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PluginNotFound { .. } | Self::PluginLoad { .. } | Self::PluginValidation { .. } => {
                ErrorCategory::Plugin
            }
            Self::Connection { .. } | Self::Write { .. } | Self::Database { .. } | Self::Sqlite(_) => {
                ErrorCategory::Database
            }
            Self::Configuration { .. } | Self::InvalidOutputMode { .. } => ErrorCategory::Configuration,
            Self::FileNotFound { .. }
            | Self::InvalidFormat { .. }
            | Self::DataProcessing { .. }
            | Self::ParquetConversion { .. }
            | Self::Io(_)
            | Self::Excel(_)
            | Self::Parquet(_)
            | Self::Arrow(_) => ErrorCategory::Processing,
        }
    }

    /// Structured diagnostic fields (offending path, plugin name, table, original cause).
    pub fn context(&self) -> BTreeMap<String, String> {
        let mut ctx = BTreeMap::new();
        match self {
            Self::PluginNotFound { kind, available, .. } => {
                ctx.insert("plugin_type".to_string(), kind.to_string());
                ctx.insert("available_plugins".to_string(), available.join(", "));
            }
            Self::PluginLoad { plugin, .. } => {
                ctx.insert("plugin_name".to_string(), plugin.clone());
            }
            Self::PluginValidation { plugin, errors } => {
                ctx.insert("plugin_name".to_string(), plugin.clone());
                ctx.insert("validation_errors".to_string(), errors.join("; "));
            }
            Self::FileNotFound { path } => {
                ctx.insert("file_path".to_string(), path.display().to_string());
            }
            Self::InvalidFormat { path, expected } => {
                ctx.insert("file_path".to_string(), path.display().to_string());
                ctx.insert("expected_format".to_string(), expected.clone());
            }
            Self::DataProcessing {
                sheet, row, source, ..
            } => {
                if let Some(sheet) = sheet {
                    ctx.insert("sheet_name".to_string(), sheet.clone());
                }
                if let Some(row) = row {
                    ctx.insert("row_number".to_string(), row.to_string());
                }
                if let Some(source) = source {
                    ctx.insert("original_error".to_string(), source.to_string());
                }
            }
            Self::ParquetConversion { path, source, .. } => {
                ctx.insert("file_path".to_string(), path.display().to_string());
                if let Some(source) = source {
                    ctx.insert("original_error".to_string(), source.to_string());
                }
            }
            Self::Connection {
                database,
                connection_string,
                source,
            } => {
                ctx.insert("database_type".to_string(), database.clone());
                ctx.insert("connection_string".to_string(), connection_string.clone());
                ctx.insert("original_error".to_string(), source.to_string());
            }
            Self::Write { database, table, .. } => {
                ctx.insert("database_type".to_string(), database.clone());
                ctx.insert("table_name".to_string(), table.clone());
            }
            Self::Database { source, .. } => {
                if let Some(source) = source {
                    ctx.insert("original_error".to_string(), source.to_string());
                }
            }
            Self::Configuration { path, errors } => {
                if let Some(path) = path {
                    ctx.insert("config_path".to_string(), path.display().to_string());
                }
                ctx.insert("validation_errors".to_string(), errors.join("; "));
            }
            Self::InvalidOutputMode { mode } => {
                ctx.insert("output_mode".to_string(), mode.clone());
            }
            Self::Io(e) => {
                ctx.insert("original_error".to_string(), e.to_string());
            }
            Self::Excel(e) => {
                ctx.insert("original_error".to_string(), e.to_string());
            }
            Self::Parquet(e) => {
                ctx.insert("original_error".to_string(), e.to_string());
            }
            Self::Arrow(e) => {
                ctx.insert("original_error".to_string(), e.to_string());
            }
            Self::Sqlite(e) => {
                ctx.insert("original_error".to_string(), e.to_string());
            }
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_not_found_lists_available_plugins_in_context() {
        let err = XlsReaderError::PluginNotFound {
            message: "no writer for 'nope://x'".to_string(),
            kind: PluginKind::Writer,
            available: vec!["SQLiteWriter".to_string()],
        };
        assert_eq!(err.category(), ErrorCategory::Plugin);
        let ctx = err.context();
        assert_eq!(ctx.get("plugin_type").map(String::as_str), Some("writer"));
        assert_eq!(ctx.get("available_plugins").map(String::as_str), Some("SQLiteWriter"));
        assert!(err.to_string().contains("SQLiteWriter"));
    }

    #[test]
    fn wrapped_processing_error_keeps_cause() {
        let inner = XlsReaderError::FileNotFound {
            path: PathBuf::from("missing.xlsx"),
        };
        let err = XlsReaderError::DataProcessing {
            message: "read failed".to_string(),
            sheet: Some("Sheet1".to_string()),
            row: None,
            source: Some(Box::new(inner)),
        };
        let ctx = err.context();
        assert_eq!(ctx.get("sheet_name").map(String::as_str), Some("Sheet1"));
        assert!(ctx["original_error"].contains("missing.xlsx"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn categories_cover_each_group() {
        assert_eq!(
            XlsReaderError::InvalidOutputMode { mode: "x".into() }.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            XlsReaderError::Write {
                database: "sqlite".into(),
                table: "t".into(),
                message: "boom".into()
            }
            .category(),
            ErrorCategory::Database
        );
        assert_eq!(XlsReaderError::processing("x").category(), ErrorCategory::Processing);
    }
}
