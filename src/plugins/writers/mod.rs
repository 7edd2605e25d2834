//! Database writers and the table-to-relation mapping they share.
//!
//! Relation and column names are sanitized to lowercase ASCII identifiers
//! (`[a-z][a-z0-9_]*`); values are normalized to the few storage classes relational engines
//! agree on.

use std::collections::HashSet;

use crate::types::{Table, Value};

pub mod sqlite;

pub use sqlite::SQLiteWriter;

/// Text form used for datetime values written to a database.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn sanitize_identifier(name: &str, prefix: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.starts_with(|c: char| c.is_ascii_alphabetic()) {
        cleaned
    } else {
        format!("{prefix}{cleaned}")
    }
}

/// Relation name from arbitrary text. Idempotent.
///
/// Spaces and dashes become `_`, anything else outside `[A-Za-z0-9_]` is dropped, the result is
/// lowercased and prefixed with `table_` unless it starts with a letter.
pub fn sanitize_table_name(name: &str) -> String {
    sanitize_identifier(name, "table_")
}

/// Column name from arbitrary text. Idempotent.
///
/// Same rules as [`sanitize_table_name`] with a `col_` prefix; empty input gives
/// `unnamed_column`.
pub fn sanitize_column_name(name: &str) -> String {
    let out = sanitize_identifier(name, "col_");
    if out == "col_" {
        "unnamed_column".to_string()
    } else {
        out
    }
}

/// Sanitized column names for `columns`, later duplicates suffixed `_1`, `_2`, ...
pub fn unique_column_names(columns: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    columns
        .iter()
        .map(|c| claim(&mut seen, sanitize_column_name(c)))
        .collect()
}

fn claim(seen: &mut HashSet<String>, base: String) -> String {
    let mut candidate = base.clone();
    let mut n = 1;
    while !seen.insert(candidate.clone()) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    candidate
}

/// Relation name for every table.
///
/// Resolution per table `i`: `explicit[i]` when present and non-blank, else the sanitized
/// sheet name, else `table_<i>`. A name already taken earlier in the same write gets a `_<i>`
/// suffix.
pub fn resolve_table_names(tables: &[Table], explicit: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tables
        .iter()
        .enumerate()
        .map(|(i, table)| {
            let base = explicit
                .get(i)
                .filter(|n| !n.trim().is_empty())
                .map(|n| sanitize_table_name(n))
                .or_else(|| {
                    table
                        .attrs
                        .sheet_name
                        .as_deref()
                        .filter(|s| !s.trim().is_empty())
                        .map(sanitize_table_name)
                })
                .unwrap_or_else(|| format!("table_{i}"));
            if seen.insert(base.clone()) {
                base
            } else {
                claim(&mut seen, format!("{base}_{i}"))
            }
        })
        .collect()
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// Whole numbers and booleans.
    Integer,
    /// Any mix of numbers.
    Real,
    /// Everything else, datetimes included.
    Text,
}

impl SqlType {
    /// Column declaration keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
        }
    }
}

/// Narrowest storage class holding every non-null value of column `idx`.
pub fn column_sql_type(table: &Table, idx: usize) -> SqlType {
    let mut ty = None;
    for value in table.column_values(idx) {
        let this = match value {
            Value::Null => continue,
            Value::Int64(_) | Value::Bool(_) => SqlType::Integer,
            Value::Float64(_) => SqlType::Real,
            Value::Utf8(_) | Value::DateTime(_) => return SqlType::Text,
        };
        ty = Some(match (ty, this) {
            (None, t) => t,
            (Some(SqlType::Integer), SqlType::Integer) => SqlType::Integer,
            _ => SqlType::Real,
        });
    }
    ty.unwrap_or(SqlType::Text)
}

/// Value as bound to a statement: datetimes as text, booleans as 0/1.
pub fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Int64(i) => Sql::Integer(*i),
        Value::Float64(f) => Sql::Real(*f),
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Utf8(s) => Sql::Text(s.clone()),
        Value::DateTime(dt) => Sql::Text(dt.format(DATETIME_FORMAT).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableAttrs;
    use chrono::NaiveDate;

    fn sheet_table(sheet: Option<&str>) -> Table {
        let attrs = TableAttrs {
            sheet_name: sheet.map(str::to_string),
            ..TableAttrs::default()
        };
        Table::new(vec!["a".into()], vec![], attrs)
    }

    #[test]
    fn table_names_are_sanitized_and_idempotent() {
        for raw in ["Sales Data-2024", "2024 report", "Ventas (Q1)", "", "__x"] {
            let once = sanitize_table_name(raw);
            assert!(once.starts_with(|c: char| c.is_ascii_lowercase()), "{once}");
            assert_eq!(sanitize_table_name(&once), once);
        }
        assert_eq!(sanitize_table_name("Sales Data-2024"), "sales_data_2024");
        assert_eq!(sanitize_table_name("2024 report"), "table_2024_report");
    }

    #[test]
    fn column_names_get_prefix_fallback_and_dedup() {
        assert_eq!(sanitize_column_name("Unit Price ($)"), "unit_price_");
        assert_eq!(sanitize_column_name("1st"), "col_1st");
        assert_eq!(sanitize_column_name("  "), "unnamed_column");
        let cols = vec!["Name".to_string(), "name".to_string(), "NAME".to_string()];
        assert_eq!(unique_column_names(&cols), vec!["name", "name_1", "name_2"]);
    }

    #[test]
    fn relation_names_prefer_explicit_then_sheet_then_index() {
        let tables = vec![
            sheet_table(Some("Sales")),
            sheet_table(Some("Inventory")),
            sheet_table(None),
            sheet_table(Some("Sales")),
        ];
        let explicit = vec!["Orders".to_string()];
        assert_eq!(
            resolve_table_names(&tables, &explicit),
            vec!["orders", "inventory", "table_2", "sales"]
        );
        let dup = vec![sheet_table(Some("Data")), sheet_table(Some("data"))];
        assert_eq!(resolve_table_names(&dup, &[]), vec!["data", "data_1"]);
    }

    #[test]
    fn values_and_column_types_normalize() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        assert_eq!(
            to_sql_value(&Value::DateTime(dt)),
            rusqlite::types::Value::Text("2024-03-01 08:30:00".into())
        );
        assert_eq!(to_sql_value(&Value::Bool(true)), rusqlite::types::Value::Integer(1));

        let t = Table::new(
            vec!["i".into(), "r".into(), "t".into(), "n".into()],
            vec![
                vec![Value::Int64(1), Value::Int64(1), Value::Int64(1), Value::Null],
                vec![Value::Bool(false), Value::Float64(0.5), Value::Utf8("x".into()), Value::Null],
            ],
            TableAttrs::default(),
        );
        assert_eq!(column_sql_type(&t, 0), SqlType::Integer);
        assert_eq!(column_sql_type(&t, 1), SqlType::Real);
        assert_eq!(column_sql_type(&t, 2), SqlType::Text);
        assert_eq!(column_sql_type(&t, 3), SqlType::Text);
    }
}
