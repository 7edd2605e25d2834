use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use xls_reader::config::ReaderConfig;
use xls_reader::plugins::ReaderPlugin;
use xls_reader::plugins::readers::GenericExcelReader;
use xls_reader::types::{Table, TableAttrs, Value};
use xls_reader::utils::parquet::{ParquetCompression, ParquetConverter};
use xls_reader::XlsReaderError;

fn tmp_path(name: &str, ext: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("xls-reader-{name}-{nanos}{ext}"))
}

fn write_inventory_xlsx(path: &Path) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Inventory").unwrap();
    ws.write_string(0, 0, "sku").unwrap();
    ws.write_string(0, 1, "qty").unwrap();
    ws.write_string(0, 2, "price").unwrap();
    ws.write_string(0, 3, "active").unwrap();
    for r in 1..=250u32 {
        ws.write_string(r, 0, format!("SKU-{r:04}")).unwrap();
        ws.write_number(r, 1, f64::from(r)).unwrap();
        ws.write_number(r, 2, f64::from(r) * 1.25).unwrap();
        ws.write_boolean(r, 3, r % 3 == 0).unwrap();
    }
    // A note with a gap row in between; only the text column is filled.
    ws.write_string(252, 0, "end of report").unwrap();
    wb.save(path).unwrap();
}

#[test]
fn extracted_tables_round_trip_through_parquet() {
    let input = tmp_path("inventory", ".xlsx");
    write_inventory_xlsx(&input);
    let tables = GenericExcelReader::default()
        .read(&input, &ReaderConfig::default())
        .unwrap();
    assert_eq!(tables.len(), 1);
    let original = &tables[0];
    assert_eq!(original.row_count(), 251);

    for compression in [
        ParquetCompression::Snappy,
        ParquetCompression::Gzip,
        ParquetCompression::Zstd,
        ParquetCompression::Uncompressed,
    ] {
        let conv = ParquetConverter::new(compression);
        let out = tmp_path("inventory", ".parquet");
        conv.table_to_parquet(original, &out).unwrap();

        let back = conv.parquet_to_table(&out).unwrap();
        assert_eq!(back.columns, original.columns);
        assert_eq!(back.row_count(), original.row_count());
        assert_eq!(back.rows[2], original.rows[2]);
        assert_eq!(back.attrs.sheet_name.as_deref(), Some("Inventory"));
        assert!(conv.validate_parquet_file(&out));
    }
}

#[test]
fn optimize_rewrites_row_groups() {
    let input = tmp_path("optimize", ".xlsx");
    write_inventory_xlsx(&input);
    let table = GenericExcelReader::default()
        .read(&input, &ReaderConfig::default())
        .unwrap()
        .remove(0);

    let conv = ParquetConverter::default();
    let original = tmp_path("optimize-in", ".parquet");
    let optimized = tmp_path("optimize-out", ".parquet");
    conv.table_to_parquet(&table, &original).unwrap();
    conv.optimize_parquet_file(&original, &optimized, 100).unwrap();

    let before = conv.parquet_metadata(&original).unwrap();
    let after = conv.parquet_metadata(&optimized).unwrap();
    assert_eq!(before.num_row_groups, 1);
    assert_eq!(after.num_row_groups, 3);
    assert_eq!(after.num_rows, 251);
    assert_eq!(after.columns, vec!["sku", "qty", "price", "active"]);

    let schema = conv.parquet_schema(&optimized).unwrap();
    assert_eq!(schema[0].unique_count, 251);
    assert_eq!(schema[1].null_count, 1);
}

#[test]
fn batch_conversion_names_files_and_stops_at_first_failure() {
    let dir = tmp_path("batch", "");
    let conv = ParquetConverter::default();
    let good = Table::new(vec!["a".into()], vec![vec![Value::Int64(1)]], TableAttrs::default());
    let bad = Table::new(vec![], vec![], TableAttrs::default());

    let files = conv
        .tables_to_parquet_batch(&[good.clone(), good.clone()], &dir, "Reader_dataframe")
        .unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["Reader_dataframe_0.parquet", "Reader_dataframe_1.parquet"]);

    let dir2 = tmp_path("batch-fail", "");
    let err = conv
        .tables_to_parquet_batch(&[good.clone(), bad, good], &dir2, "x")
        .unwrap_err();
    assert!(matches!(err, XlsReaderError::ParquetConversion { .. }));
    assert!(dir2.join("x_0.parquet").exists());
    assert!(!dir2.join("x_2.parquet").exists());
}

#[test]
fn metadata_of_missing_file_is_not_found() {
    let err = ParquetConverter::default()
        .parquet_metadata(tmp_path("absent", ".parquet"))
        .unwrap_err();
    assert!(matches!(err, XlsReaderError::FileNotFound { .. }));
}
