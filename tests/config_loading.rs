use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use xls_reader::config::{ConfigManager, IfExists, XlsReaderConfig, save_config};
use xls_reader::kernel::Kernel;
use xls_reader::plugins::Plugin;
use xls_reader::utils::parquet::ParquetCompression;
use xls_reader::XlsReaderError;

fn tmp_file(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("xls-reader-{name}-{nanos}.{ext}"))
}

#[test]
fn toml_document_loads_into_typed_config() {
    let path = tmp_file("config", "toml");
    std::fs::write(
        &path,
        r#"
plugin_paths = ["plugins/readers/generic", "plugins/writers"]

[reader]
header_row = 1
skip_rows = [3]

[readers.BOMReader]
clean_data = false

[readers.BOMReader.categories]
descriptions = false

[writers.SQLiteWriter]
batch_size = 250
if_exists = "append"

[logging]
level = "debug"

[output]
directory = "parquet-out"
compression = "zstd"
"#,
    )
    .unwrap();

    let mut manager = ConfigManager::new();
    let raw = manager.load_config(&path).unwrap();
    let cfg = XlsReaderConfig::from_json(raw, Some(path.as_path())).unwrap();

    assert_eq!(cfg.plugin_paths, vec!["plugins/readers/generic", "plugins/writers"]);
    assert_eq!(cfg.reader.header_row, 1);
    assert_eq!(cfg.reader.skip_rows, vec![3]);

    let bom = cfg.reader_config_for("BOMReader");
    assert!(!bom.clean_data);
    assert!(!bom.category_enabled("descriptions"));
    assert!(bom.category_enabled("materials"));

    let writer = &cfg.writers["SQLiteWriter"];
    assert_eq!(writer.batch_size, Some(250));
    assert_eq!(writer.if_exists, Some(IfExists::Append));
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.output.directory, PathBuf::from("parquet-out"));
    assert_eq!(cfg.output.compression, ParquetCompression::Zstd);
    assert!(cfg.database.is_none());
}

#[test]
fn loaded_documents_are_cached_until_cleared() {
    let path = tmp_file("cached", "json");
    std::fs::write(&path, r#"{"logging": {"level": "warn"}}"#).unwrap();

    let mut manager = ConfigManager::new();
    let first = manager.load_config(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(manager.load_config(&path).unwrap(), first);

    manager.clear_cache();
    let err = manager.load_config(&path).unwrap_err();
    assert!(matches!(err, XlsReaderError::Configuration { .. }));
}

#[test]
fn invalid_documents_are_rejected_with_every_violation() {
    let path = tmp_file("invalid", "json");
    std::fs::write(
        &path,
        r#"{"plugin_paths": "plugins", "output": {"compression": "lz4"}, "database": {"batch_size": "big"}}"#,
    )
    .unwrap();

    match ConfigManager::new().load_config(&path).unwrap_err() {
        XlsReaderError::Configuration { path: Some(p), errors } => {
            assert_eq!(p, path);
            assert_eq!(errors.len(), 3, "{errors:?}");
        }
        other => panic!("unexpected error: {other}"),
    }

    let broken = tmp_file("broken", "toml");
    std::fs::write(&broken, "plugin_paths = [").unwrap();
    assert!(matches!(
        ConfigManager::new().load_config(&broken).unwrap_err(),
        XlsReaderError::Configuration { .. }
    ));

    let yaml = tmp_file("unsupported", "yaml");
    std::fs::write(&yaml, "plugin_paths: []").unwrap();
    assert!(ConfigManager::new().load_config(&yaml).is_err());
}

#[test]
fn saved_documents_load_back_in_either_format() {
    let doc = json!({
        "plugin_paths": ["plugins/readers/templates/bom"],
        "database": {"connection_string": "sqlite:///tmp/bom.db", "if_exists": "fail"},
        "logging": {"level": "error", "json": true}
    });

    for ext in ["json", "toml"] {
        let path = tmp_file("saved", ext);
        save_config(&doc, &path).unwrap();
        let loaded = ConfigManager::new().load_config(&path).unwrap();
        assert_eq!(loaded, doc, "{ext}");
    }

    assert!(save_config(&doc, tmp_file("saved", "ini")).is_err());
}

#[test]
fn kernel_discovers_only_configured_plugin_paths() {
    let path = tmp_file("kernel", "json");
    std::fs::write(
        &path,
        r#"{"plugin_paths": ["plugins/readers/templates/bom", "plugins/missing", "plugins/writers"]}"#,
    )
    .unwrap();

    let kernel = Kernel::from_config_file(Some(path.as_path())).unwrap();
    let readers: Vec<_> = kernel.registry().list_readers().iter().map(|r| r.name().to_string()).collect();
    assert_eq!(readers, vec!["BOMReader"]);
    assert_eq!(kernel.registry().writer_names(), vec!["SQLiteWriter"]);

    let err = Kernel::from_config_file(Some(tmp_file("absent", "json").as_path())).unwrap_err();
    assert!(matches!(err, XlsReaderError::Configuration { .. }));
}
