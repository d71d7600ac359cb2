//! Record shaping: column-name → value mappings materialized from rows,
//! plus string and JSON conversions for the delivery seam.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Row;

/// A single row shaped as a column-name → value mapping.
pub type Record = HashMap<String, Value>;

/// Materializes a row into a `Record` using the statement's column names.
pub fn record_from_row(row: &Row, columns: &[String]) -> rusqlite::Result<Record> {
    let mut record = Record::with_capacity(columns.len());
    for (index, name) in columns.iter().enumerate() {
        record.insert(name.clone(), row.get(index)?);
    }
    Ok(record)
}

/// Renders a value as the string used for result keys and option labels.
///
/// NULL renders as the empty string; blobs are rendered lossily.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(t) => t.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

/// Converts a record to a JSON object for response serialization.
///
/// Blobs are converted lossily to strings; integral values map to JSON
/// numbers.
pub fn record_to_json(record: &Record) -> serde_json::Value {
    let mut object = serde_json::Map::with_capacity(record.len());
    for (name, value) in record {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(f) => serde_json::Value::from(*f),
            Value::Text(t) => serde_json::Value::from(t.as_str()),
            Value::Blob(b) => serde_json::Value::from(String::from_utf8_lossy(b).into_owned()),
        };
        object.insert(name.clone(), json);
    }
    serde_json::Value::Object(object)
}

/// Converts an ordered result set to a JSON array.
pub fn records_to_json(records: &[Record]) -> serde_json::Value {
    serde_json::Value::Array(records.iter().map(record_to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_record_from_row() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER, name TEXT, score REAL);
             INSERT INTO t VALUES (1, 'Alice', 9.5);",
        )
        .unwrap();

        let mut stmt = conn.prepare("SELECT id, name, score FROM t").unwrap();
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let records: Vec<Record> = stmt
            .query_map([], |row| record_from_row(row, &columns))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], Value::Integer(1));
        assert_eq!(records[0]["name"], Value::Text("Alice".to_string()));
        assert_eq!(records[0]["score"], Value::Real(9.5));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&Value::Integer(42)), "42");
        assert_eq!(value_to_string(&Value::Text("x".to_string())), "x");
        assert_eq!(value_to_string(&Value::Blob(b"ab".to_vec())), "ab");
    }

    #[test]
    fn test_record_to_json() {
        let mut record = Record::new();
        record.insert("id".to_string(), Value::Integer(7));
        record.insert("name".to_string(), Value::Text("seven".to_string()));
        record.insert("missing".to_string(), Value::Null);

        let json = record_to_json(&record);
        assert_eq!(json["id"], serde_json::json!(7));
        assert_eq!(json["name"], serde_json::json!("seven"));
        assert!(json["missing"].is_null());
    }
}
