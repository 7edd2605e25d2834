//! Configuration documents, environment overrides, and the typed option blocks readers and
//! writers consume.
//!
//! Documents are JSON (`.json`) or TOML (`.toml`). Loading goes through [`ConfigManager`], which
//! validates against a small JSON-Schema-like description, caches by path, and can merge the
//! result with `XLS_READER_*` environment variables before producing a typed
//! [`XlsReaderConfig`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;

use crate::error::{XlsReaderError, XlsResult};
use crate::plugins::PluginKind;
use crate::utils::parquet::ParquetCompression;

/// Env var overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "XLS_READER_LOG_LEVEL";
/// Env var overriding `output.directory`.
pub const ENV_OUTPUT_DIR: &str = "XLS_READER_OUTPUT_DIR";
/// Env var overriding `plugin_paths` (comma separated).
pub const ENV_PLUGIN_PATHS: &str = "XLS_READER_PLUGIN_PATHS";
/// Env var overriding `database.connection_string`.
pub const ENV_DB_CONNECTION: &str = "XLS_READER_DB_CONNECTION";

/// Rows per insert chunk when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Options every reader accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Sheets to read; empty means all sheets in workbook order.
    pub sheet_names: Vec<String>,
    /// 0-based row holding column headers (generic reader).
    pub header_row: usize,
    /// 0-based absolute row indices to drop (generic reader).
    pub skip_rows: Vec<usize>,
    /// Strip fully empty rows and columns.
    pub clean_data: bool,
    /// Per-category toggles for template readers; missing entries are enabled.
    pub categories: BTreeMap<String, bool>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sheet_names: Vec::new(),
            header_row: 0,
            skip_rows: Vec::new(),
            clean_data: true,
            categories: BTreeMap::new(),
        }
    }
}

impl ReaderConfig {
    /// Whether a template category should be extracted.
    pub fn category_enabled(&self, category: &str) -> bool {
        self.categories.get(category).copied().unwrap_or(true)
    }
}

/// Overwrite policy for relations that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Refuse to touch an existing relation.
    Fail,
    /// Drop and recreate.
    #[default]
    Replace,
    /// Insert after the existing rows.
    Append,
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IfExists::Fail => "fail",
            IfExists::Replace => "replace",
            IfExists::Append => "append",
        })
    }
}

impl FromStr for IfExists {
    type Err = XlsReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            other => Err(XlsReaderError::config(
                None,
                format!("if_exists must be one of fail, replace, append (got '{other}')"),
            )),
        }
    }
}

/// Per-writer defaults from the `writers.<name>` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Rows per insert chunk.
    pub batch_size: Option<usize>,
    /// Overwrite policy.
    pub if_exists: Option<IfExists>,
}

/// Where and how to write tables to a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseWriteConfig {
    /// Target descriptor, e.g. `sqlite:///data/out.db`.
    pub connection_string: String,
    /// Explicit relation names, matched to tables by position.
    pub table_names: Vec<String>,
    /// Rows per insert chunk; falls back to the writer block, then [`DEFAULT_BATCH_SIZE`].
    pub batch_size: Option<usize>,
    /// Overwrite policy; falls back to the writer block, then [`IfExists::Replace`].
    pub if_exists: Option<IfExists>,
}

impl DatabaseWriteConfig {
    /// Config targeting `connection_string` with every other field defaulted.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            ..Self::default()
        }
    }

    /// Fill unset fields from a writer's option block. Explicit fields win.
    pub fn layered(&self, writer: Option<&WriterOptions>) -> Self {
        let mut out = self.clone();
        if let Some(opts) = writer {
            out.batch_size = out.batch_size.or(opts.batch_size);
            out.if_exists = out.if_exists.or(opts.if_exists);
        }
        out
    }

    /// Batch size after defaults; never zero.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1)
    }

    /// Overwrite policy after defaults.
    pub fn effective_if_exists(&self) -> IfExists {
        self.if_exists.unwrap_or_default()
    }
}

/// `logging` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `output` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default directory for columnar files.
    pub directory: PathBuf,
    /// Codec for columnar files.
    pub compression: ParquetCompression,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            compression: ParquetCompression::default(),
        }
    }
}

/// Typed top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XlsReaderConfig {
    /// Ordered plugin search paths; empty means the built-in defaults.
    pub plugin_paths: Vec<String>,
    /// Options applied to every reader without its own block.
    #[serde(alias = "reader_config")]
    pub reader: ReaderConfig,
    /// Per-reader option blocks keyed by plugin name.
    pub readers: BTreeMap<String, ReaderConfig>,
    /// Per-writer option blocks keyed by plugin name.
    pub writers: BTreeMap<String, WriterOptions>,
    /// Logging setup.
    pub logging: LoggingConfig,
    /// Columnar output defaults.
    pub output: OutputConfig,
    /// Database target used when the caller does not pass one.
    pub database: Option<DatabaseWriteConfig>,
}

impl XlsReaderConfig {
    /// Reader options for `reader_name`: its own block, else the shared `reader` block.
    pub fn reader_config_for(&self, reader_name: &str) -> ReaderConfig {
        self.readers
            .get(reader_name)
            .cloned()
            .unwrap_or_else(|| self.reader.clone())
    }

    /// Convert a merged JSON document into the typed configuration.
    pub fn from_json(value: JsonValue, path: Option<&Path>) -> XlsResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| XlsReaderError::config(path.map(Path::to_path_buf), e.to_string()))
    }
}

/// Loads, validates, merges, and saves configuration documents.
///
/// Loaded documents are cached by path; a second `load_config` for the same path does not touch
/// the filesystem.
#[derive(Debug)]
pub struct ConfigManager {
    schema: JsonValue,
    cache: HashMap<PathBuf, JsonValue>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Manager validating against [`default_schema`].
    pub fn new() -> Self {
        Self::with_schema(default_schema())
    }

    /// Manager validating against a caller-supplied schema.
    pub fn with_schema(schema: JsonValue) -> Self {
        Self {
            schema,
            cache: HashMap::new(),
        }
    }

    /// Load a `.json` or `.toml` document and validate it.
    pub fn load_config(&mut self, path: impl AsRef<Path>) -> XlsResult<JsonValue> {
        let path = path.as_ref();
        if let Some(cached) = self.cache.get(path) {
            debug!(path = %path.display(), "configuration cache hit");
            return Ok(cached.clone());
        }
        if !path.exists() {
            return Err(XlsReaderError::config(
                Some(path.to_path_buf()),
                "configuration file not found",
            ));
        }

        let text = fs::read_to_string(path)?;
        let value = parse_document(path, &text)?;

        let errors = validate_config(&value, &self.schema);
        if !errors.is_empty() {
            return Err(XlsReaderError::Configuration {
                path: Some(path.to_path_buf()),
                errors,
            });
        }

        debug!(path = %path.display(), "configuration loaded");
        self.cache.insert(path.to_path_buf(), value.clone());
        Ok(value)
    }

    /// Drop all cached documents.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Load `path` (if any), apply environment overrides, and convert to [`XlsReaderConfig`].
    pub fn resolve(&mut self, path: Option<&Path>) -> XlsResult<XlsReaderConfig> {
        let file = match path {
            Some(p) => self.load_config(p)?,
            None => JsonValue::Object(Map::new()),
        };
        let merged = merge_configs(&[file, env_config()]);
        XlsReaderConfig::from_json(merged, path)
    }
}

fn parse_document(path: &Path, text: &str) -> XlsResult<JsonValue> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let parsed = match ext.as_str() {
        "json" => serde_json::from_str::<JsonValue>(text).map_err(|e| e.to_string()),
        "toml" => toml::from_str::<JsonValue>(text).map_err(|e| e.to_string()),
        other => Err(format!("unsupported configuration format '.{other}' (expected .json or .toml)")),
    };
    parsed.map_err(|message| XlsReaderError::config(Some(path.to_path_buf()), message))
}

/// Schema for the top-level document.
pub fn default_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "plugin_paths": { "type": "array" },
            "reader": { "type": "object" },
            "reader_config": { "type": "object" },
            "readers": { "type": "object" },
            "writers": { "type": "object" },
            "logging": {
                "type": "object",
                "properties": {
                    "level": { "type": "string", "enum": ["trace", "debug", "info", "warn", "error"] },
                    "json": { "type": "boolean" }
                }
            },
            "output": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" },
                    "compression": { "type": "string", "enum": ["uncompressed", "snappy", "gzip", "zstd"] }
                }
            },
            "database": {
                "type": "object",
                "properties": {
                    "connection_string": { "type": "string" },
                    "table_names": { "type": "array" },
                    "batch_size": { "type": "integer" },
                    "if_exists": { "type": "string", "enum": ["fail", "replace", "append"] }
                }
            }
        }
    })
}

/// Check `value` against a JSON-Schema-like `schema` (`type`, `enum`, `required`, nested
/// `properties`). Returns one message per violation.
pub fn validate_config(value: &JsonValue, schema: &JsonValue) -> Vec<String> {
    let mut errors = Vec::new();
    validate_node(value, schema, "$", &mut errors);
    errors
}

fn validate_node(value: &JsonValue, schema: &JsonValue, at: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.get("type").and_then(JsonValue::as_str) {
        if !type_matches(value, expected) {
            errors.push(format!("{at}: expected {expected}, got {}", json_type_name(value)));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(JsonValue::as_array) {
        if !allowed.contains(value) {
            errors.push(format!("{at}: {value} is not one of {}", JsonValue::Array(allowed.clone())));
        }
    }

    let Some(obj) = value.as_object() else {
        return;
    };

    if let Some(required) = schema.get("required").and_then(JsonValue::as_array) {
        for key in required.iter().filter_map(JsonValue::as_str) {
            if !obj.contains_key(key) {
                errors.push(format!("{at}: missing required property '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(JsonValue::as_object) {
        for (key, sub_schema) in props {
            if let Some(sub_value) = obj.get(key) {
                validate_node(sub_value, sub_schema, &format!("{at}.{key}"), errors);
            }
        }
    }
}

fn type_matches(value: &JsonValue, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_f64() => "number",
        JsonValue::Number(_) => "integer",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Environment overrides read from the process environment.
pub fn env_config() -> JsonValue {
    env_config_from(|key| std::env::var(key).ok())
}

/// Environment overrides read through `lookup`; only variables that are set (and non-empty)
/// produce keys.
pub fn env_config_from(lookup: impl Fn(&str) -> Option<String>) -> JsonValue {
    let mut root = Map::new();
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(level) = get(ENV_LOG_LEVEL) {
        root.insert("logging".into(), json!({ "level": level.to_ascii_lowercase() }));
    }
    if let Some(dir) = get(ENV_OUTPUT_DIR) {
        root.insert("output".into(), json!({ "directory": dir }));
    }
    if let Some(paths) = get(ENV_PLUGIN_PATHS) {
        let list: Vec<String> = paths
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        root.insert("plugin_paths".into(), json!(list));
    }
    if let Some(conn) = get(ENV_DB_CONNECTION) {
        root.insert("database".into(), json!({ "connection_string": conn }));
    }
    JsonValue::Object(root)
}

/// Deep-merge documents left to right: objects merge key by key, anything else is replaced by the
/// later document.
pub fn merge_configs(configs: &[JsonValue]) -> JsonValue {
    let mut out = JsonValue::Object(Map::new());
    for cfg in configs {
        merge_into(&mut out, cfg);
    }
    out
}

fn merge_into(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let nested = value.is_object() && base_map.get(key).is_some_and(JsonValue::is_object);
                match base_map.get_mut(key) {
                    Some(existing) if nested => merge_into(existing, value),
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Write `value` as JSON or TOML (chosen by extension), creating parent directories.
pub fn save_config(value: &JsonValue, path: impl AsRef<Path>) -> XlsResult<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let text = match ext.as_str() {
        "json" => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
        "toml" => toml::to_string_pretty(value).map_err(|e| e.to_string()),
        other => Err(format!("unsupported configuration format '.{other}' (expected .json or .toml)")),
    }
    .map_err(|message| XlsReaderError::config(Some(path.to_path_buf()), message))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

/// The option block for one plugin: `readers.<name>` or `writers.<name>`.
pub fn plugin_config<'a>(config: &'a JsonValue, name: &str, kind: PluginKind) -> Option<&'a JsonValue> {
    let section = match kind {
        PluginKind::Reader => "readers",
        PluginKind::Writer => "writers",
    };
    config.get(section).and_then(|s| s.get(name))
}
