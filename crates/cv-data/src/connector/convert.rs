//! SQLite rows to Arrow record batches

use std::sync::Arc;
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use rusqlite::types::Value;
use rusqlite::Statement;

use crate::DataError;

/// Run `stmt` and collect every row into a single batch.
///
/// Column types are inferred from the returned values: integers map to
/// `Int64`, any real promotes the column to `Float64`, anything textual makes
/// it `Utf8`. Columns without a single non-null value fall back to their
/// declared type.
pub fn rows_to_batch(stmt: &mut Statement<'_>) -> Result<RecordBatch, DataError> {
    let columns: Vec<(String, Option<String>)> = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .collect();

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); columns.len()];
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for (idx, column) in values.iter_mut().enumerate() {
            column.push(row.get::<_, Value>(idx)?);
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for ((name, decl_type), column) in columns.iter().zip(&values) {
        let data_type = infer_type(column, decl_type.as_deref());
        arrays.push(build_array(&data_type, column));
        fields.push(Field::new(name, data_type, true));
    }

    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    Ok(RecordBatch::try_new(schema, arrays)?)
}

fn infer_type(values: &[Value], decl_type: Option<&str>) -> DataType {
    let (mut integers, mut reals, mut text) = (false, false, false);
    for value in values {
        match value {
            Value::Null => {}
            Value::Integer(_) => integers = true,
            Value::Real(_) => reals = true,
            Value::Text(_) | Value::Blob(_) => text = true,
        }
    }

    match (integers, reals, text) {
        (_, _, true) => DataType::Utf8,
        (_, true, false) => DataType::Float64,
        (true, false, false) => DataType::Int64,
        (false, false, false) => decl_type.map(declared_type).unwrap_or(DataType::Utf8),
    }
}

/// Arrow type for a declared SQLite column type
fn declared_type(decl_type: &str) -> DataType {
    match decl_type.to_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" => DataType::Int64,
        "REAL" | "FLOAT" | "DOUBLE" => DataType::Float64,
        "BOOLEAN" => DataType::Boolean,
        _ => DataType::Utf8,
    }
}

fn build_array(data_type: &DataType, values: &[Value]) -> ArrayRef {
    match data_type {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Integer(i) => builder.append_value(*i),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Real(f) => builder.append_value(*f),
                    Value::Integer(i) => builder.append_value(*i as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Integer(i) => builder.append_value(*i != 0),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Value::Text(s) => builder.append_value(s),
                    Value::Integer(i) => builder.append_value(i.to_string()),
                    Value::Real(f) => builder.append_value(f.to_string()),
                    Value::Blob(b) => builder.append_value(String::from_utf8_lossy(b)),
                    Value::Null => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}
