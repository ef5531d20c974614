use std::path::Path;

use serde_json::{Map, Value};

use super::LoadError;
use crate::dataset::{finish_headers, Cell, Dataset};

pub fn load_records(path: &Path) -> Result<Dataset, LoadError> {
    let content = std::fs::read_to_string(path)?;
    parse_records(&content)
}

/// Accepts one record or a list of records; nested objects are flattened into
/// `parent.child` columns.
pub fn parse_records(content: &str) -> Result<Dataset, LoadError> {
    let value: Value = serde_json::from_str(content)?;
    let records = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut flattened = Vec::with_capacity(records.len());
    for record in records {
        match record {
            Value::Object(map) => {
                let mut row = Vec::new();
                flatten_into(&mut row, None, map);
                flattened.push(row);
            }
            other => return Err(LoadError::NotARecord(kind_of(&other))),
        }
    }

    let mut names: Vec<String> = Vec::new();
    for row in &flattened {
        for (key, _) in row {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }
    if names.is_empty() {
        return Err(LoadError::Empty);
    }

    let mut columns: Vec<Vec<Cell>> = vec![Vec::with_capacity(flattened.len()); names.len()];
    for row in flattened {
        for (name, column) in names.iter().zip(columns.iter_mut()) {
            let cell = row
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| to_cell(value))
                .unwrap_or(Cell::Null);
            column.push(cell);
        }
    }

    let headers = finish_headers(names.into_iter().map(Some).collect());
    Ok(Dataset::from_cells(headers.into_iter().zip(columns).collect())?)
}

fn flatten_into(row: &mut Vec<(String, Value)>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let name = match prefix {
            Some(parent) => format!("{parent}.{key}"),
            None => key,
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(row, Some(&name), inner),
            other => row.push((name, other)),
        }
    }
}

fn to_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(v) => Cell::Bool(*v),
        Value::Number(n) => n
            .as_i64()
            .map(Cell::Int)
            .or_else(|| n.as_f64().map(Cell::Float))
            .unwrap_or(Cell::Null),
        Value::String(s) if s.trim().is_empty() => Cell::Null,
        Value::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use polars::prelude::DataType;

    use super::*;

    #[test]
    fn single_record_becomes_one_row() {
        let dataset =
            parse_records(r#"{"time": "2024-05-01 10:00:00", "pollen": 12, "mold": 0.5}"#)
                .expect("parse");
        assert_eq!(dataset.height(), 1);
        assert!(dataset.has_column("time"));
        assert_eq!(
            dataset.series("pollen").expect("pollen").dtype(),
            &DataType::Int64
        );
    }

    #[test]
    fn nested_records_are_flattened_and_missing_keys_are_null() {
        let dataset = parse_records(
            r#"[
                {"time": "2024-05-01 10:00:00", "pollen": 3, "sensor": {"id": "A"}},
                {"time": "2024-05-01 11:00:00", "pollen": 4.5}
            ]"#,
        )
        .expect("parse");
        let mut names = dataset.column_names();
        names.sort();
        assert_eq!(names, vec!["pollen", "sensor.id", "time"]);
        let ids = dataset.series("sensor.id").expect("sensor.id");
        assert_eq!(ids.null_count(), 1);
        assert_eq!(
            dataset.series("pollen").expect("pollen").dtype(),
            &DataType::Float64
        );
    }

    #[test]
    fn rejects_non_object_records() {
        assert!(matches!(
            parse_records("[1, 2]"),
            Err(LoadError::NotARecord("a number"))
        ));
    }
}
