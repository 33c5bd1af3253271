use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

use crate::models::{FieldValue, Record};

/// External query engine failure; fatal for the report being generated.
#[derive(Debug)]
pub struct QueryError {
    pub detail: String,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warehouse query failed: {}", self.detail)
    }
}

impl std::error::Error for QueryError {}

/// The seam to the warehouse. Takes SQL, returns uniform typed records.
pub trait QueryEngine {
    fn run(&self, sql: &str) -> Result<Vec<Record>, QueryError>;
}

/// Runs queries through the `bq` command-line tool and parses its JSON
/// output. Paging is sidestepped by asking for a generous row cap; reports
/// display a top slice and snapshot the rest.
#[derive(Debug, Clone)]
pub struct BqCommandEngine {
    program: PathBuf,
}

impl Default for BqCommandEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bq"),
        }
    }
}

impl BqCommandEngine {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl QueryEngine for BqCommandEngine {
    fn run(&self, sql: &str) -> Result<Vec<Record>, QueryError> {
        let output = Command::new(&self.program)
            .args(["-q", "--format=json", "--headless", "query", "--max_rows=10000"])
            .arg(sql)
            .output()
            .map_err(|error| QueryError {
                detail: format!("cannot spawn {} ({error})", self.program.display()),
            })?;
        if !output.status.success() {
            return Err(QueryError {
                detail: format!(
                    "query tool exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let raw = String::from_utf8(output.stdout).map_err(|error| QueryError {
            detail: format!("query output is not UTF-8 ({error})"),
        })?;
        parse_query_output(&raw)
    }
}

/// Parses the engine's JSON array of row objects into typed records.
/// Coercion is best-effort per cell: integer, then float, else text; raw
/// nulls become the explicit absent marker.
pub fn parse_query_output(raw: &str) -> Result<Vec<Record>, QueryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<Value> = serde_json::from_str(trimmed).map_err(|error| QueryError {
        detail: format!("query output is not a JSON array ({error})"),
    })?;

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let Some(object) = row.as_object() else {
            return Err(QueryError {
                detail: format!("query output row {} is not an object", index + 1),
            });
        };
        let mut record = Record::new();
        for (name, value) in object {
            record.set(name.clone(), coerce_value(value));
        }
        records.push(record);
    }
    Ok(records)
}

/// Best-effort coercion of one raw cell to a tagged value.
#[must_use]
pub fn coerce_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Absent,
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                FieldValue::Int(int)
            } else {
                FieldValue::Float(number.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(text) => {
            if let Ok(int) = text.parse::<i64>() {
                FieldValue::Int(int)
            } else if let Ok(float) = text.parse::<f64>() {
                FieldValue::Float(float)
            } else {
                FieldValue::Text(text.clone())
            }
        }
        Value::Bool(flag) => FieldValue::Text(flag.to_string()),
        other => FieldValue::Text(other.to_string()),
    }
}
