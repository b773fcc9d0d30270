//! CSV row I/O. Rows are order-preserving string maps rather than a fixed
//! struct, since the set of output/metadata columns is configuration, not
//! code (spec.md §9 "Dynamic column handling").

use crate::errors::WorkerError;
use serde_json::{Map, Value};
use std::path::Path;

pub type RowRecord = Map<String, Value>;

pub fn row_id(row: &RowRecord) -> Option<i64> {
    row.get("RowID").and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

pub fn get_str<'a>(row: &'a RowRecord, column: &str) -> &'a str {
    row.get(column).and_then(|v| v.as_str()).unwrap_or("")
}

/// Load a CSV file into ordered rows. If `RowID` is absent, none is
/// synthesized here: the worker assigns synthetic RowIDs after slicing,
/// per spec.md §4.3 step 2.
pub fn read_csv(path: &Path) -> Result<Vec<RowRecord>, WorkerError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| WorkerError::Csv { path: path.to_path_buf(), source })?;
    let headers = reader
        .headers()
        .map_err(|source| WorkerError::Csv { path: path.to_path_buf(), source })?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| WorkerError::Csv { path: path.to_path_buf(), source })?;
        let mut row = RowRecord::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(value.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows as CSV, taking the column order from the first row's keys.
/// Every row in one write is assumed to share the same shape, which holds
/// here because a checkpoint/output batch is produced by one Processor
/// pass over one configured column set.
pub fn rows_to_csv_bytes(rows: &[RowRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(first) = rows.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        writer.write_record(&headers)?;
        for row in rows {
            let values: Vec<String> = headers
                .iter()
                .map(|h| match row.get(*h) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect();
            writer.write_record(&values)?;
        }
    }
    writer.flush().map_err(csv::Error::from)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

pub fn read_csv_from_path(path: &Path) -> Result<Vec<RowRecord>, WorkerError> {
    read_csv(path)
}
