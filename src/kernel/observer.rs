use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::XlsReaderError;
use crate::types::ProcessingResult;

use super::OutputMode;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (processing failed).
    Error,
    /// Critical error (missing inputs, I/O or connection failures).
    Critical,
}

/// The file and output mode a `process` call is working on.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// The input path.
    pub path: PathBuf,
    /// Requested output channels.
    pub mode: OutputMode,
}

/// Pipeline milestones reported through [`ProcessObserver::on_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// Reader selected, extraction starting.
    Read,
    /// Extraction done, validation starting.
    Validate,
    /// Columnar output starting.
    Columnar,
    /// Database output starting.
    Database,
    /// Everything finished.
    Complete,
}

impl Milestone {
    /// Fixed progress fraction for this milestone.
    pub fn progress(self) -> f64 {
        match self {
            Milestone::Read => 0.1,
            Milestone::Validate => 0.3,
            Milestone::Columnar => 0.5,
            Milestone::Database => 0.7,
            Milestone::Complete => 1.0,
        }
    }

    /// Human message.
    pub fn message(self) -> &'static str {
        match self {
            Milestone::Read => "reading file",
            Milestone::Validate => "validating data",
            Milestone::Columnar => "writing parquet files",
            Milestone::Database => "writing to database",
            Milestone::Complete => "processing complete",
        }
    }
}

/// Observer interface for `process` outcomes.
///
/// Every method has a no-op default; implementors override what they need.
pub trait ProcessObserver: Send + Sync {
    /// Called once per milestone, with non-decreasing progress in `[0, 1]`.
    fn on_progress(&self, _ctx: &ProcessContext, _milestone: Milestone) {}

    /// Called when processing succeeds.
    fn on_success(&self, _ctx: &ProcessContext, _result: &ProcessingResult) {}

    /// Called when processing fails.
    fn on_failure(&self, _ctx: &ProcessContext, _severity: Severity, _error: &XlsReaderError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &ProcessContext, severity: Severity, error: &XlsReaderError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Severity of a `process` failure: missing inputs and infrastructure failures are critical.
pub fn severity_for_error(e: &XlsReaderError) -> Severity {
    match e {
        XlsReaderError::FileNotFound { .. } | XlsReaderError::Io(_) | XlsReaderError::Connection { .. } => {
            Severity::Critical
        }
        XlsReaderError::DataProcessing { source: Some(inner), .. }
        | XlsReaderError::Database { source: Some(inner), .. } => severity_for_error(inner).max(Severity::Error),
        _ => Severity::Error,
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ProcessObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn ProcessObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl ProcessObserver for CompositeObserver {
    fn on_progress(&self, ctx: &ProcessContext, milestone: Milestone) {
        for o in &self.observers {
            o.on_progress(ctx, milestone);
        }
    }

    fn on_success(&self, ctx: &ProcessContext, result: &ProcessingResult) {
        for o in &self.observers {
            o.on_success(ctx, result);
        }
    }

    fn on_failure(&self, ctx: &ProcessContext, severity: Severity, error: &XlsReaderError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &ProcessContext, severity: Severity, error: &XlsReaderError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Appends one line per processing event to a journal file.
///
/// Lines look like `<unix secs> <event> path=<input> ...`, where the event is `progress`, `ok`,
/// `fail` or `ALERT`. Journal write failures are ignored.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Journal appending to `path` (created on first event).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn record(&self, event: &str, ctx: &ProcessContext, detail: fmt::Arguments<'_>) {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{ts} {event} path={} mode={} {detail}", ctx.path.display(), ctx.mode);
        }
    }
}

impl ProcessObserver for FileObserver {
    fn on_progress(&self, ctx: &ProcessContext, milestone: Milestone) {
        self.record(
            "progress",
            ctx,
            format_args!("at={:.1} step=\"{}\"", milestone.progress(), milestone.message()),
        );
    }

    fn on_success(&self, ctx: &ProcessContext, result: &ProcessingResult) {
        self.record(
            "ok",
            ctx,
            format_args!(
                "reader={} tables={} outputs={} warnings={}",
                result.reader_used,
                result.tables_count,
                result.outputs.len(),
                result.validation_warnings.len()
            ),
        );
    }

    fn on_failure(&self, ctx: &ProcessContext, severity: Severity, error: &XlsReaderError) {
        self.record(
            "fail",
            ctx,
            format_args!("severity={severity:?} category={:?} err={error}", error.category()),
        );
    }

    fn on_alert(&self, ctx: &ProcessContext, severity: Severity, error: &XlsReaderError) {
        self.record(
            "ALERT",
            ctx,
            format_args!("severity={severity:?} context={:?}", error.context()),
        );
    }
}
