//! The "process one file" pipeline.
//!
//! [`Kernel::process`] selects a reader for the file, extracts and validates its tables, then
//! fans out to Parquet files and/or a database writer depending on the requested
//! [`OutputMode`].
//!
//! - If an [`observer::ProcessObserver`] is provided, progress milestones, success, failure and
//!   alerts are reported to it.
//! - Output modes are parsed before anything touches the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigManager, DatabaseWriteConfig, XlsReaderConfig};
use crate::error::{XlsReaderError, XlsResult};
use crate::plugins::registry::{DEFAULT_SEARCH_PATHS, DiscoveryReport, PluginCatalog, PluginInstance, PluginRegistry};
use crate::plugins::{Plugin, PluginKind, PluginMetadata, ReaderPlugin};
use crate::types::{OutputRecord, ProcessingResult, SchemaDescriptor, Table};
use crate::utils::excel::{self, SheetInfo};
use crate::utils::parquet::ParquetConverter;

pub mod observer;

pub use observer::{
    CompositeObserver, FileObserver, Milestone, ProcessContext, ProcessObserver, Severity,
    severity_for_error,
};

/// Which output channels a `process` call feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// One Parquet file per table (`parquet` or `columnar`).
    Parquet,
    /// One relation per table through a writer plugin.
    Database,
    /// Both of the above.
    Both,
}

impl OutputMode {
    /// Whether Parquet files are written.
    pub fn wants_parquet(self) -> bool {
        matches!(self, OutputMode::Parquet | OutputMode::Both)
    }

    /// Whether a database write is attempted.
    pub fn wants_database(self) -> bool {
        matches!(self, OutputMode::Database | OutputMode::Both)
    }
}

impl FromStr for OutputMode {
    type Err = XlsReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parquet" | "columnar" => Ok(OutputMode::Parquet),
            "database" => Ok(OutputMode::Database),
            "both" => Ok(OutputMode::Both),
            _ => Err(XlsReaderError::InvalidOutputMode { mode: s.to_string() }),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputMode::Parquet => "parquet",
            OutputMode::Database => "database",
            OutputMode::Both => "both",
        })
    }
}

/// Per-call options for [`Kernel::process`].
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct ProcessOptions {
    /// Directory for Parquet files; defaults to the configured `output.directory`.
    pub output_dir: Option<PathBuf>,
    /// Database target; defaults to the configured `database` block.
    pub database: Option<DatabaseWriteConfig>,
    /// Optional observer for progress, logging and alerts.
    pub observer: Option<Arc<dyn ProcessObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl fmt::Debug for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOptions")
            .field("output_dir", &self.output_dir)
            .field("database", &self.database)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            database: None,
            observer: None,
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Registered plugin names per partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PluginListing {
    /// Reader names in selection order.
    pub readers: Vec<String>,
    /// Writer names in selection order.
    pub writers: Vec<String>,
}

/// Outcome of [`Kernel::test_plugin`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginTestReport {
    /// Plugin under test.
    pub plugin: String,
    /// Its partition.
    pub kind: PluginKind,
    /// File path or connection string probed.
    pub input: String,
    /// The plugin's `can_handle` verdict.
    pub can_handle: bool,
    /// Whether the read (readers) or connection probe (writers) succeeded.
    pub succeeded: bool,
    /// Tables extracted, for readers that got as far as reading.
    pub tables: Option<usize>,
    /// Failure description.
    pub error: Option<String>,
}

/// Shape of one extracted table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    /// Origin sheet.
    pub sheet: Option<String>,
    /// Category tag.
    pub data_type: Option<String>,
    /// Column names.
    pub columns: Vec<String>,
    /// Row count.
    pub rows: usize,
}

/// Dry-run report from [`Kernel::inspect_file`]; nothing is written.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInspection {
    /// Inspected file.
    pub path: PathBuf,
    /// Sheet names and extents.
    pub sheets: Vec<SheetInfo>,
    /// Reader that would be used.
    pub reader: String,
    /// That reader's schema.
    pub schema: SchemaDescriptor,
    /// Tables it extracts.
    pub tables: Vec<TableSummary>,
    /// Validation warnings.
    pub warnings: Vec<String>,
}

/// Configuration, live plugins, and the pipeline tying them together.
#[derive(Debug)]
pub struct Kernel {
    config: XlsReaderConfig,
    registry: PluginRegistry,
    converter: ParquetConverter,
    discovery: DiscoveryReport,
}

impl Kernel {
    /// Kernel over the built-in plugins.
    pub fn new(config: XlsReaderConfig) -> Self {
        Self::with_catalog(config, &PluginCatalog::builtin())
    }

    /// Kernel discovering plugins from `catalog`.
    ///
    /// Search paths are `config.plugin_paths`, or [`DEFAULT_SEARCH_PATHS`] when empty.
    pub fn with_catalog(config: XlsReaderConfig, catalog: &PluginCatalog) -> Self {
        let mut registry = PluginRegistry::new();
        if config.plugin_paths.is_empty() {
            DEFAULT_SEARCH_PATHS.iter().for_each(|p| registry.add_search_path(p));
        } else {
            config.plugin_paths.iter().for_each(|p| registry.add_search_path(p));
        }
        let discovery = registry.discover(catalog);
        let converter = ParquetConverter::new(config.output.compression);
        Self {
            config,
            registry,
            converter,
            discovery,
        }
    }

    /// Kernel configured from an optional file plus environment overrides.
    pub fn from_config_file(path: Option<&Path>) -> XlsResult<Self> {
        let config = ConfigManager::new().resolve(path)?;
        Ok(Self::new(config))
    }

    /// Effective configuration.
    pub fn config(&self) -> &XlsReaderConfig {
        &self.config
    }

    /// Live plugins.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Live plugins, for direct registration.
    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    /// What the startup discovery pass registered and skipped.
    pub fn discovery_report(&self) -> &DiscoveryReport {
        &self.discovery
    }

    /// Process one file.
    ///
    /// `mode` is `parquet` (alias `columnar`), `database` or `both`; anything else fails with
    /// [`XlsReaderError::InvalidOutputMode`] before the file is touched.
    ///
    /// When an observer is configured, this reports:
    ///
    /// - `on_progress` at each milestone (output milestones only for requested channels)
    /// - `on_success` with the aggregate result
    /// - `on_failure` on failure, with a computed severity
    /// - `on_alert` on failure when the severity is >= `options.alert_at_or_above`
    pub fn process(
        &self,
        path: impl AsRef<Path>,
        mode: &str,
        options: &ProcessOptions,
    ) -> XlsResult<ProcessingResult> {
        let mode = mode.parse::<OutputMode>()?;
        self.process_with_mode(path.as_ref(), mode, options)
    }

    /// [`Kernel::process`] with an already-parsed mode.
    pub fn process_with_mode(
        &self,
        path: &Path,
        mode: OutputMode,
        options: &ProcessOptions,
    ) -> XlsResult<ProcessingResult> {
        let ctx = ProcessContext {
            path: path.to_path_buf(),
            mode,
        };
        let result = self.run_pipeline(&ctx, options);
        if let Err(e) = &result {
            error!(path = %path.display(), mode = %mode, error = %e, "processing failed");
        }

        if let Some(obs) = options.observer.as_ref() {
            match &result {
                Ok(r) => obs.on_success(&ctx, r),
                Err(e) => {
                    let sev = severity_for_error(e);
                    obs.on_failure(&ctx, sev, e);
                    if sev >= options.alert_at_or_above {
                        obs.on_alert(&ctx, sev, e);
                    }
                }
            }
        }
        result
    }

    fn run_pipeline(&self, ctx: &ProcessContext, options: &ProcessOptions) -> XlsResult<ProcessingResult> {
        let progress = |milestone: Milestone| {
            debug!(progress = milestone.progress(), "{}", milestone.message());
            if let Some(obs) = options.observer.as_ref() {
                obs.on_progress(ctx, milestone);
            }
        };
        let path = ctx.path.as_path();

        if !path.exists() {
            return Err(XlsReaderError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let reader = self.select_reader(path)?;
        info!(path = %path.display(), reader = reader.name(), mode = %ctx.mode, "processing file");

        progress(Milestone::Read);
        let tables = self.read_tables(reader.as_ref(), path)?;

        progress(Milestone::Validate);
        let mut warnings = reader.validate(&tables);
        for w in &warnings {
            warn!(path = %path.display(), "{w}");
        }

        let mut outputs = Vec::new();
        if ctx.mode.wants_parquet() {
            progress(Milestone::Columnar);
            let dir = options
                .output_dir
                .clone()
                .unwrap_or_else(|| self.config.output.directory.clone());
            let prefix = format!("{}_dataframe", reader.name());
            let files = self
                .converter
                .tables_to_parquet_batch(&tables, &dir, &prefix)
                .map_err(|e| XlsReaderError::DataProcessing {
                    message: format!("parquet output to {} failed", dir.display()),
                    sheet: None,
                    row: None,
                    source: Some(Box::new(e)),
                })?;
            outputs.push(OutputRecord::Parquet {
                count: files.len(),
                files,
            });
        }

        if ctx.mode.wants_database() {
            progress(Milestone::Database);
            match options.database.as_ref().or(self.config.database.as_ref()) {
                Some(db) => outputs.push(self.write_database(&tables, db)?),
                None => {
                    let msg = "database output requested without a database configuration; skipped".to_string();
                    warn!(path = %path.display(), "{msg}");
                    warnings.push(msg);
                }
            }
        }

        progress(Milestone::Complete);
        Ok(ProcessingResult {
            file_path: path.to_path_buf(),
            reader_used: reader.name().to_string(),
            tables_count: tables.len(),
            validation_warnings: warnings,
            outputs,
        })
    }

    fn select_reader(&self, path: &Path) -> XlsResult<Arc<dyn ReaderPlugin>> {
        self.registry
            .select_reader(path)
            .ok_or_else(|| XlsReaderError::PluginNotFound {
                message: format!("no reader plugin can handle {}", path.display()),
                kind: PluginKind::Reader,
                available: self.registry.reader_names(),
            })
    }

    fn read_tables(&self, reader: &dyn ReaderPlugin, path: &Path) -> XlsResult<Vec<Table>> {
        let reader_config = self.config.reader_config_for(reader.name());
        reader
            .read(path, &reader_config)
            .map_err(|e| XlsReaderError::DataProcessing {
                message: format!("{} failed to read {}", reader.name(), path.display()),
                sheet: None,
                row: None,
                source: Some(Box::new(e)),
            })
    }

    fn write_database(&self, tables: &[Table], db: &DatabaseWriteConfig) -> XlsResult<OutputRecord> {
        let writer = self
            .registry
            .select_writer(&db.connection_string)
            .ok_or_else(|| XlsReaderError::PluginNotFound {
                message: format!("no writer plugin can handle '{}'", db.connection_string),
                kind: PluginKind::Writer,
                available: self.registry.writer_names(),
            })?;
        let config = db.layered(self.config.writers.get(writer.name()));

        match writer.write(tables, &config) {
            Ok(true) => Ok(OutputRecord::Database {
                writer: writer.name().to_string(),
                success: true,
                tables_written: tables.iter().filter(|t| t.column_count() > 0).count(),
            }),
            Ok(false) => Err(XlsReaderError::Database {
                message: format!("{} reported an unsuccessful write", writer.name()),
                source: None,
            }),
            Err(e) => Err(XlsReaderError::Database {
                message: format!("{} failed to write tables", writer.name()),
                source: Some(Box::new(e)),
            }),
        }
    }

    /// Process every file matching a glob pattern, in path order.
    ///
    /// Per-file failures are returned alongside successes; only a bad pattern or output mode
    /// fails the whole call.
    pub fn process_glob(
        &self,
        pattern: &str,
        mode: &str,
        options: &ProcessOptions,
    ) -> XlsResult<Vec<(PathBuf, XlsResult<ProcessingResult>)>> {
        let mode = mode.parse::<OutputMode>()?;
        let entries = glob::glob(pattern)
            .map_err(|e| XlsReaderError::config(None, format!("invalid glob pattern '{pattern}': {e}")))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(error = %e, "unreadable glob entry");
                    None
                }
            })
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        info!(pattern, files = paths.len(), "processing glob");

        Ok(paths
            .into_iter()
            .map(|p| {
                let result = self.process_with_mode(&p, mode, options);
                (p, result)
            })
            .collect())
    }

    /// Registered plugin names.
    pub fn list_available_plugins(&self) -> PluginListing {
        PluginListing {
            readers: self.registry.reader_names(),
            writers: self.registry.writer_names(),
        }
    }

    /// Metadata of a registered plugin.
    pub fn get_plugin_info(&self, name: &str, kind: PluginKind) -> Option<PluginMetadata> {
        self.registry
            .get_by_name(name, kind)
            .map(|p| p.metadata().clone())
    }

    /// Exercise one plugin against an input: a file path for readers, a connection string for
    /// writers. Plugin failures are reported, not returned as errors.
    pub fn test_plugin(&self, name: &str, kind: PluginKind, input: &str) -> XlsResult<PluginTestReport> {
        let plugin = self
            .registry
            .get_by_name(name, kind)
            .ok_or_else(|| XlsReaderError::PluginNotFound {
                message: format!("no {kind} plugin named '{name}'"),
                kind,
                available: match kind {
                    PluginKind::Reader => self.registry.reader_names(),
                    PluginKind::Writer => self.registry.writer_names(),
                },
            })?;

        let mut report = PluginTestReport {
            plugin: name.to_string(),
            kind,
            input: input.to_string(),
            can_handle: false,
            succeeded: false,
            tables: None,
            error: None,
        };
        match plugin {
            PluginInstance::Reader(reader) => {
                let path = Path::new(input);
                report.can_handle = reader.can_handle(path);
                if report.can_handle {
                    match reader.read(path, &self.config.reader_config_for(name)) {
                        Ok(tables) => {
                            report.succeeded = true;
                            report.tables = Some(tables.len());
                        }
                        Err(e) => report.error = Some(e.to_string()),
                    }
                }
            }
            PluginInstance::Writer(writer) => {
                report.can_handle = writer.can_handle(input);
                if report.can_handle {
                    report.succeeded = writer.test_connection(input);
                    if !report.succeeded {
                        report.error = Some("connection probe failed".to_string());
                    }
                }
            }
        }
        Ok(report)
    }

    /// Select a reader and extract, without writing anything.
    pub fn inspect_file(&self, path: impl AsRef<Path>) -> XlsResult<FileInspection> {
        let path = path.as_ref();
        excel::validate_excel_file(path)?;
        let reader = self.select_reader(path)?;
        let tables = self.read_tables(reader.as_ref(), path)?;
        let warnings = reader.validate(&tables);

        Ok(FileInspection {
            path: path.to_path_buf(),
            sheets: excel::sheet_info(path)?,
            reader: reader.name().to_string(),
            schema: reader.schema(),
            tables: tables
                .iter()
                .map(|t| TableSummary {
                    sheet: t.attrs.sheet_name.clone(),
                    data_type: t.attrs.data_type.clone(),
                    columns: t.columns.clone(),
                    rows: t.row_count(),
                })
                .collect(),
            warnings,
        })
    }
}
