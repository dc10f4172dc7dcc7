//! CSV and JSON Lines staging converters
//!
//! Both directions are column-agnostic so the staging copy keeps every
//! source column, including the ones the typed reader ignores.

use serde_json::{Map, Number, Value};
use serde_jsonlines::{json_lines, JsonLinesWriter};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line} of {} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf, line: usize },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConvertError + '_ {
    move |source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConvertError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(io_error(parent))
        },
        _ => Ok(()),
    }
}

/// Write each CSV row as one JSON object per line, keys in header order.
/// Returns the number of rows written.
pub fn csv_to_json(csv_path: impl AsRef<Path>, json_path: impl AsRef<Path>) -> Result<usize, ConvertError> {
    let (csv_path, json_path) = (csv_path.as_ref(), json_path.as_ref());

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    let numeric = numeric_columns(headers.len(), &records);

    ensure_parent(json_path)?;
    let file = File::create(json_path).map_err(io_error(json_path))?;
    let mut writer = JsonLinesWriter::new(BufWriter::new(file));

    for record in &records {
        let object: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .zip(&numeric)
            .map(|((key, cell), &numeric)| (key.to_string(), cell_to_json(cell, numeric)))
            .collect();

        writer.write(&object).map_err(io_error(json_path))?;
    }
    writer.flush().map_err(io_error(json_path))?;
    let rows = records.len();

    info!(from = %csv_path.display(), to = %json_path.display(), rows, "Converted CSV to JSON Lines");
    Ok(rows)
}

/// Write JSON Lines objects back to CSV. The header is the union of keys in
/// first-seen order; missing keys and nulls become empty cells.
pub fn json_to_csv(json_path: impl AsRef<Path>, csv_path: impl AsRef<Path>) -> Result<usize, ConvertError> {
    let (json_path, csv_path) = (json_path.as_ref(), csv_path.as_ref());

    let mut objects = Vec::new();
    for (index, line) in json_lines::<Value, _>(json_path)
        .map_err(io_error(json_path))?
        .enumerate()
    {
        match line.map_err(io_error(json_path))? {
            Value::Object(object) => objects.push(object),
            _ => {
                return Err(ConvertError::NotAnObject {
                    path: json_path.to_path_buf(),
                    line: index + 1,
                })
            },
        }
    }

    let mut seen = HashSet::new();
    let mut header: Vec<String> = Vec::new();
    for key in objects.iter().flat_map(|object| object.keys()) {
        if seen.insert(key.as_str()) {
            header.push(key.clone());
        }
    }

    ensure_parent(csv_path)?;
    let mut writer = csv::Writer::from_path(csv_path)?;
    if !header.is_empty() {
        writer.write_record(&header)?;
    }
    for object in &objects {
        writer.write_record(header.iter().map(|key| json_to_cell(object.get(key))))?;
    }
    writer.flush().map_err(io_error(csv_path))?;

    info!(from = %json_path.display(), to = %csv_path.display(), rows = objects.len(), "Converted JSON Lines to CSV");
    Ok(objects.len())
}

/// A column is numeric when every non-empty cell converts to a number
fn numeric_columns(width: usize, records: &[csv::StringRecord]) -> Vec<bool> {
    (0..width)
        .map(|column| {
            records
                .iter()
                .filter_map(|record| record.get(column))
                .filter(|cell| !cell.is_empty())
                .all(|cell| exact_number(cell).is_some())
        })
        .collect()
}

/// The cell as a JSON number, only if rendering it gives back the same text
fn exact_number(cell: &str) -> Option<Number> {
    let number = match cell.parse::<i64>() {
        Ok(int) => Number::from(int),
        Err(_) => Number::from_f64(cell.parse::<f64>().ok()?)?,
    };
    (number.to_string() == cell).then_some(number)
}

fn cell_to_json(cell: &str, numeric: bool) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }

    match exact_number(cell) {
        Some(number) if numeric => Value::Number(number),
        _ => Value::String(cell.to_string()),
    }
}

fn json_to_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}
