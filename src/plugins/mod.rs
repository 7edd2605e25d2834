//! Plugin contracts and the built-in reader/writer implementations.
//!
//! A reader turns a spreadsheet into [`Table`]s; a writer persists tables to a database target.
//! Both expose [`PluginMetadata`] through [`Plugin`] and are selected by their `can_handle`
//! predicate via [`registry::PluginRegistry`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{DatabaseWriteConfig, ReaderConfig};
use crate::error::XlsResult;
use crate::types::{SchemaDescriptor, Table};
use crate::utils::excel::validate_table_schema;

pub mod readers;
pub mod registry;
pub mod writers;

/// The two registry partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Extracts tables from files.
    Reader,
    /// Persists tables to a target.
    Writer,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PluginKind::Reader => "reader",
            PluginKind::Writer => "writer",
        })
    }
}

/// Descriptive metadata every plugin carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Unique key within the plugin's registry partition.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Human description.
    pub description: String,
    /// Author.
    pub author: String,
    /// Declared partition.
    pub kind: PluginKind,
    /// Format tags (`xlsx`, `sqlite`, ...).
    pub supported_formats: Vec<String>,
    /// JSON-Schema-like description of the plugin's options; documentation only.
    pub configuration_schema: Option<serde_json::Value>,
}

impl PluginMetadata {
    /// Problems with the metadata itself, checked at registration time.
    pub fn validate(&self, expected: PluginKind) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("plugin name must not be empty".to_string());
        }
        if self.version.trim().is_empty() {
            errors.push("plugin version must not be empty".to_string());
        }
        if self.kind != expected {
            errors.push(format!("declared kind '{}' does not match {expected} registration", self.kind));
        }
        errors
    }
}

/// Common plugin surface.
pub trait Plugin: Send + Sync {
    /// The plugin's metadata.
    fn metadata(&self) -> &PluginMetadata;

    /// Shorthand for `metadata().name`.
    fn name(&self) -> &str {
        &self.metadata().name
    }
}

/// Reader capability.
pub trait ReaderPlugin: Plugin {
    /// Whether this reader should handle `path`.
    ///
    /// Must be cheap and must not fail: unreadable or corrupt files yield `false`.
    fn can_handle(&self, path: &Path) -> bool;

    /// Extract tables from `path`.
    ///
    /// Fails when the file cannot be opened, is not a spreadsheet, or yields no tables.
    fn read(&self, path: &Path, config: &ReaderConfig) -> XlsResult<Vec<Table>>;

    /// What this reader's tables are expected to look like.
    fn schema(&self) -> SchemaDescriptor;

    /// Post-hoc warnings for extracted tables. Never fails; internal errors become a single
    /// warning.
    fn validate(&self, tables: &[Table]) -> Vec<String> {
        let schema = self.schema();
        let mut warnings = Vec::new();
        for (i, table) in tables.iter().enumerate() {
            if table.is_empty() {
                warnings.push(format!("Table {i} is empty"));
                continue;
            }
            match validate_table_schema(table, &schema) {
                Ok(found) => warnings.extend(found.into_iter().map(|w| format!("Table {i}: {w}"))),
                Err(e) => return vec![format!("Validation error: {e}")],
            }
        }
        warnings
    }
}

/// Writer capability.
pub trait WriterPlugin: Plugin {
    /// Whether this writer accepts `connection_string` (scheme or file suffix match).
    fn can_handle(&self, connection_string: &str) -> bool;

    /// Write every table as its own relation in one unit of work.
    fn write(&self, tables: &[Table], config: &DatabaseWriteConfig) -> XlsResult<bool>;

    /// Target kinds this writer supports.
    fn supported_targets(&self) -> Vec<String>;

    /// Open-and-close probe. Never fails; problems yield `false`.
    fn test_connection(&self, connection_string: &str) -> bool;
}
