use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;
use rusqlite::Connection;

use xls_reader::config::{DatabaseWriteConfig, IfExists};
use xls_reader::plugins::WriterPlugin;
use xls_reader::plugins::writers::SQLiteWriter;
use xls_reader::types::{Table, TableAttrs, Value};
use xls_reader::XlsReaderError;

fn tmp_db(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("xls-reader-{name}-{nanos}.db"))
}

fn sheet(name: &str, rows: usize) -> Table {
    let attrs = TableAttrs::for_sheet(name, "input.xlsx");
    let created = NaiveDate::from_ymd_opt(2024, 5, 17)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    Table::new(
        vec!["Item Name".into(), "Qty".into(), "Active".into(), "Created".into()],
        (0..rows)
            .map(|i| {
                vec![
                    Value::Utf8(format!("item-{i}")),
                    Value::Int64(i as i64),
                    Value::Bool(i % 2 == 0),
                    Value::DateTime(created),
                ]
            })
            .collect(),
        attrs,
    )
}

fn count(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn write_then_probe_reports_success() {
    let db = tmp_db("probe");
    let conn_str = format!("sqlite:///{}", db.display());
    let writer = SQLiteWriter::default();

    assert!(writer.write(&[sheet("Sales Q1", 3)], &DatabaseWriteConfig::new(&conn_str)).unwrap());
    assert!(writer.test_connection(&conn_str));
    assert_eq!(count(&db, "sales_q1"), 3);
}

#[test]
fn columns_are_sanitized_and_values_normalized() {
    let db = tmp_db("normalize");
    let writer = SQLiteWriter::default();
    writer
        .write(&[sheet("Data", 2)], &DatabaseWriteConfig::new(db.display().to_string()))
        .unwrap();

    let conn = Connection::open(&db).unwrap();
    let (name, active, created): (String, i64, String) = conn
        .query_row(
            "SELECT item_name, active, created FROM data ORDER BY qty LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .unwrap();
    assert_eq!(name, "item-0");
    assert_eq!(active, 1);
    assert_eq!(created, "2024-05-17 09:15:00");

    let info = writer.table_info(&db.display().to_string(), "data").unwrap();
    let decls: Vec<(&str, &str)> = info.columns.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
    assert_eq!(
        decls,
        vec![("item_name", "TEXT"), ("qty", "INTEGER"), ("active", "INTEGER"), ("created", "TEXT")]
    );
}

#[test]
fn overwrite_policies() {
    let db = tmp_db("policies");
    let conn_str = db.display().to_string();
    let writer = SQLiteWriter::default();
    let tables = [sheet("Data", 4)];

    writer.write(&tables, &DatabaseWriteConfig::new(&conn_str)).unwrap();
    writer.write(&tables, &DatabaseWriteConfig::new(&conn_str)).unwrap();
    assert_eq!(count(&db, "data"), 4);

    let mut append = DatabaseWriteConfig::new(&conn_str);
    append.if_exists = Some(IfExists::Append);
    writer.write(&tables, &append).unwrap();
    assert_eq!(count(&db, "data"), 8);

    let mut fail = DatabaseWriteConfig::new(&conn_str);
    fail.if_exists = Some(IfExists::Fail);
    let err = writer.write(&tables, &fail).unwrap_err();
    assert!(matches!(err, XlsReaderError::Write { ref table, .. } if table == "data"));
    assert_eq!(count(&db, "data"), 8);
}

#[test]
fn failed_relation_rolls_back_earlier_ones() {
    let db = tmp_db("rollback");
    let conn_str = db.display().to_string();
    let writer = SQLiteWriter::default();
    writer.write(&[sheet("Existing", 1)], &DatabaseWriteConfig::new(&conn_str)).unwrap();

    let mut fail = DatabaseWriteConfig::new(&conn_str);
    fail.if_exists = Some(IfExists::Fail);
    fail.table_names = vec!["fresh".into(), "existing".into()];
    writer
        .write(&[sheet("A", 2), sheet("B", 2)], &fail)
        .unwrap_err();

    let conn = Connection::open(&db).unwrap();
    let fresh: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'fresh'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(fresh, 0);
}

#[test]
fn small_batches_and_wide_chunks_insert_every_row() {
    let db = tmp_db("batches");
    let mut config = DatabaseWriteConfig::new(db.display().to_string());
    config.batch_size = Some(3);
    config.table_names = vec!["items".into()];
    SQLiteWriter::default().write(&[sheet("ignored", 10)], &config).unwrap();
    assert_eq!(count(&db, "items"), 10);
}

#[test]
fn duplicate_sheet_names_get_distinct_relations() {
    let db = tmp_db("dupes");
    SQLiteWriter::default()
        .write(&[sheet("Data", 1), sheet("data", 2)], &DatabaseWriteConfig::new(db.display().to_string()))
        .unwrap();
    assert_eq!(count(&db, "data"), 1);
    assert_eq!(count(&db, "data_1"), 2);
}

#[test]
fn indexes_and_missing_table_info() {
    let db = tmp_db("indexes");
    let conn_str = db.display().to_string();
    let writer = SQLiteWriter::default();
    writer.write(&[sheet("Data", 2)], &DatabaseWriteConfig::new(&conn_str)).unwrap();
    writer
        .create_indexes(&conn_str, "data", &["qty".to_string(), "item_name".to_string()])
        .unwrap();

    let conn = Connection::open(&db).unwrap();
    let indexes: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'data'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(indexes, 2);

    assert!(writer.table_info(&conn_str, "nope").is_err());
}

#[test]
fn connection_check_on_absent_database_creates_nothing() {
    let db = tmp_db("absent-check");
    let conn_str = format!("sqlite:///{}", db.display());
    let writer = SQLiteWriter::default();

    assert!(!writer.test_connection(&conn_str));
    assert!(!db.exists());

    assert!(writer.write(&[sheet("Data", 1)], &DatabaseWriteConfig::new(&conn_str)).unwrap());
    assert!(writer.test_connection(&conn_str));
}

#[test]
fn unreachable_target_fails_and_probe_returns_false() {
    // The parent "directory" is a regular file.
    let blocker = tmp_db("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let conn_str = blocker.join("nested.db").display().to_string();
    let writer = SQLiteWriter::default();

    assert!(!writer.test_connection(&conn_str));
    let err = writer
        .write(&[sheet("Data", 1)], &DatabaseWriteConfig::new(&conn_str))
        .unwrap_err();
    assert!(
        matches!(err, XlsReaderError::Connection { .. } | XlsReaderError::Io(_)),
        "{err}"
    );
}
