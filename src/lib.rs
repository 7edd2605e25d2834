//! `xls-reader` ingests spreadsheet documents through a small plugin microkernel and emits the
//! extracted tables as Parquet files and/or SQLite relations.
//!
//! The primary entrypoint is [`kernel::Kernel::process`], which picks the first registered
//! reader able to handle a file, extracts and validates its tables, and fans out to the
//! requested outputs.
//!
//! ## What you can read
//!
//! **File formats (by extension):** `.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`.
//!
//! **Readers, in selection order:**
//!
//! - [`plugins::readers::SDMReader`]: SDM specification documents
//! - [`plugins::readers::QuotationReader`]: quotation cover sheets
//! - [`plugins::readers::BOMReader`]: bills of materials
//! - [`plugins::readers::SalesReportReader`]: sales/technical reports
//! - [`plugins::readers::GenericExcelReader`]: any workbook, one table per sheet
//!
//! Template readers recognize their documents by file or sheet name keywords and emit one
//! [`types::Table`] per category (dates, client info, materials, ...). Cells become typed
//! [`types::Value`]s; empty cells and empty strings map to [`types::Value::Null`].
//!
//! ## Quick example: workbook to Parquet
//!
//! ```no_run
//! use xls_reader::config::XlsReaderConfig;
//! use xls_reader::kernel::{Kernel, ProcessOptions};
//!
//! # fn main() -> Result<(), xls_reader::XlsReaderError> {
//! let kernel = Kernel::new(XlsReaderConfig::default());
//! let opts = ProcessOptions {
//!     output_dir: Some("out".into()),
//!     ..Default::default()
//! };
//! let result = kernel.process("report.xlsx", "parquet", &opts)?;
//! println!("reader={} tables={}", result.reader_used, result.tables_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: workbook to SQLite
//!
//! ```no_run
//! use xls_reader::config::{DatabaseWriteConfig, IfExists, XlsReaderConfig};
//! use xls_reader::kernel::{Kernel, ProcessOptions};
//!
//! # fn main() -> Result<(), xls_reader::XlsReaderError> {
//! let kernel = Kernel::new(XlsReaderConfig::default());
//! let mut db = DatabaseWriteConfig::new("sqlite:///data/out.db");
//! db.table_names = vec!["sales".into(), "inventory".into()];
//! db.if_exists = Some(IfExists::Append);
//!
//! let opts = ProcessOptions {
//!     database: Some(db),
//!     ..Default::default()
//! };
//! kernel.process("report.xlsx", "database", &opts)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration and logging
//!
//! [`config::ConfigManager`] loads `.json`/`.toml` documents, validates them, and layers the
//! `XLS_READER_*` environment variables on top; [`logging::init_logging`] installs a `tracing`
//! subscriber from the resulting [`config::LoggingConfig`].
//!
//! ```no_run
//! use std::path::Path;
//!
//! use xls_reader::kernel::Kernel;
//!
//! # fn main() -> Result<(), xls_reader::XlsReaderError> {
//! let kernel = Kernel::from_config_file(Some(Path::new("xls_reader.toml")))?;
//! xls_reader::logging::init_logging(&kernel.config().logging)?;
//! for (path, outcome) in kernel.process_glob("incoming/*.xlsx", "both", &Default::default())? {
//!     println!("{}: {}", path.display(), outcome.is_ok());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Pass a [`kernel::ProcessObserver`] in [`kernel::ProcessOptions`] to receive progress
//! milestones, success/failure callbacks, and alerts at or above a [`kernel::Severity`]
//! threshold. [`kernel::FileObserver`] journals events to a file and [`kernel::CompositeObserver`]
//! fans them out to several observers.

pub mod config;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod plugins;
pub mod types;
pub mod utils;

pub use error::{ErrorCategory, XlsReaderError, XlsResult};
pub use kernel::{Kernel, OutputMode, ProcessOptions};
