//! JSON dataset loading and calendar field derivation

use std::path::Path;
use indexmap::IndexMap;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value as JsonValue};

use cv_core::sql::quote_identifier;

use crate::connector::SqliteConnector;
use crate::DataError;

/// One JSON object per row
pub type JsonRecord = Map<String, JsonValue>;

/// SQLite storage class inferred for a JSON column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ColumnKind {
    Integer,
    Real,
    Text,
}

impl ColumnKind {
    fn of(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Bool(_) => Some(ColumnKind::Integer),
            JsonValue::Number(n) if n.is_i64() => Some(ColumnKind::Integer),
            JsonValue::Number(_) => Some(ColumnKind::Real),
            _ => Some(ColumnKind::Text),
        }
    }

    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        }
    }
}

/// Columns in order of first appearance, widened across all records
fn detect_columns(records: &[JsonRecord]) -> IndexMap<String, ColumnKind> {
    let mut columns: IndexMap<String, Option<ColumnKind>> = IndexMap::new();
    for record in records {
        for (name, value) in record {
            let kind = ColumnKind::of(value);
            let entry = columns.entry(name.clone()).or_insert(None);
            *entry = (*entry).max(kind);
        }
    }
    columns
        .into_iter()
        .map(|(name, kind)| (name, kind.unwrap_or(ColumnKind::Text)))
        .collect()
}

fn to_sql_value(value: Option<&JsonValue>) -> SqlValue {
    match value {
        None | Some(JsonValue::Null) => SqlValue::Null,
        Some(JsonValue::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(JsonValue::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Some(JsonValue::String(s)) => SqlValue::Text(s.clone()),
        Some(other) => SqlValue::Text(other.to_string()),
    }
}

/// Create `table` from `records` and insert them in one transaction.
/// Returns the number of rows inserted.
pub async fn load_json_records(
    connector: &SqliteConnector,
    table: &str,
    records: Vec<JsonRecord>,
) -> Result<usize, DataError> {
    if records.is_empty() {
        return Err(DataError::SchemaDetection(format!(
            "No records to load into '{}'",
            table
        )));
    }

    let columns = detect_columns(&records);
    let table_ident = quote_identifier(table);
    let create = format!(
        "CREATE TABLE {} ({})",
        table_ident,
        columns
            .iter()
            .map(|(name, kind)| format!("{} {}", quote_identifier(name), kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_ident,
        columns.keys().map(|name| quote_identifier(name)).collect::<Vec<_>>().join(", "),
        (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
    );
    let names: Vec<String> = columns.keys().cloned().collect();

    let rows = connector
        .with_connection(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(&create, [])?;
            {
                let mut stmt = tx.prepare(&insert)?;
                for record in &records {
                    let values = names.iter().map(|name| to_sql_value(record.get(name)));
                    stmt.execute(rusqlite::params_from_iter(values))?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await?;

    tracing::info!("Loaded {} rows ({} columns) into '{}'", rows, columns.len(), table);
    Ok(rows)
}

/// Read a JSON array of objects from `path` and load it into `table`
pub async fn load_json_file(
    connector: &SqliteConnector,
    table: &str,
    path: impl AsRef<Path>,
) -> Result<usize, DataError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let records: Vec<JsonRecord> = serde_json::from_str(&text)?;
    tracing::debug!("Read {} records from {}", records.len(), path.display());
    load_json_records(connector, table, records).await
}

/// Statement script adding the calendar columns derived from
/// `timestamp_column`, shifted by `offset_hours`:
///
/// - `HourOfDay`: integer in `[0, 23]`
/// - `DayOfWeek`: integer in `[0, 6]` where 0 is Monday
/// - `WeekStartMonday`: `YYYY-MM-DD` of the Monday starting that week
///
/// The script runs in a single transaction.
pub fn derive_calendar_fields(table: &str, timestamp_column: &str, offset_hours: i32) -> String {
    let table = quote_identifier(table);
    let local = format!("{}, '{:+} hours'", quote_identifier(timestamp_column), offset_hours);
    let weekday = format!("((CAST(strftime('%w', {local}) AS INTEGER) + 6) % 7)");

    format!(
        "BEGIN TRANSACTION;\n\
         ALTER TABLE {table} ADD COLUMN \"HourOfDay\" INTEGER;\n\
         UPDATE {table} SET \"HourOfDay\" = CAST(strftime('%H', {local}) AS INTEGER);\n\
         ALTER TABLE {table} ADD COLUMN \"DayOfWeek\" INTEGER;\n\
         UPDATE {table} SET \"DayOfWeek\" = {weekday};\n\
         ALTER TABLE {table} ADD COLUMN \"WeekStartMonday\" TEXT;\n\
         UPDATE {table} SET \"WeekStartMonday\" = date({local}, '-' || {weekday} || ' days');\n\
         COMMIT TRANSACTION;"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: JsonValue) -> Vec<JsonRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_columns_widen_across_records() {
        let columns = detect_columns(&records(json!([
            { "id": 1, "fare": 10, "note": null },
            { "id": 2, "fare": 12.5, "vendor": "A" },
        ])));

        let kinds: Vec<(&str, ColumnKind)> = columns.iter().map(|(n, k)| (n.as_str(), *k)).collect();
        assert_eq!(
            kinds,
            vec![
                ("id", ColumnKind::Integer),
                ("fare", ColumnKind::Real),
                ("note", ColumnKind::Text),
                ("vendor", ColumnKind::Text),
            ]
        );
    }

    #[test]
    fn test_calendar_script_applies_offset() {
        let script = derive_calendar_fields("trips", "TripCreated", -5);
        assert!(script.starts_with("BEGIN TRANSACTION;"));
        assert!(script.contains(r#"strftime('%H', "TripCreated", '-5 hours')"#));
        assert!(script.contains(r#"ALTER TABLE "trips" ADD COLUMN "WeekStartMonday" TEXT"#));
        assert!(script.ends_with("COMMIT TRANSACTION;"));

        let script = derive_calendar_fields("trips", "TripCreated", 0);
        assert!(script.contains("'+0 hours'"));
    }

    #[tokio::test]
    async fn test_empty_records_are_rejected() {
        let connector = SqliteConnector::open_in_memory().unwrap();
        let err = load_json_records(&connector, "t", Vec::new()).await.unwrap_err();
        assert!(matches!(err, DataError::SchemaDetection(_)));
    }
}
