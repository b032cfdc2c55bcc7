use crate::error::{EvalError, EvalResult};
use crate::models::Record;
use serde_json::Value;
use std::path::Path;

/// Load up to `max_items` records from a `.jsonl` file (one object per line)
/// or a JSON file holding an array of objects. `None` or a negative count
/// loads everything. Record order follows the file.
pub fn load(path: &Path, max_items: Option<i64>) -> EvalResult<Vec<Record>> {
    let content = std::fs::read_to_string(path).map_err(|source| EvalError::io(path, source))?;
    let limit = max_items.filter(|n| *n >= 0).map(|n| n as usize);

    let is_jsonl = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jsonl"));

    if is_jsonl {
        load_lines(path, &content, limit)
    } else {
        load_array(path, &content, limit)
    }
}

/// Dataset name used in reports and file names: the file stem
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn load_lines(path: &Path, content: &str, limit: Option<usize>) -> EvalResult<Vec<Record>> {
    let rows = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(limit.unwrap_or(usize::MAX));

    let mut records = Vec::new();
    for (line_index, line) in rows {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| dataset_error(path, format!("line {}: {e}", line_index + 1)))?;
        records.push(into_record(path, value, || format!("line {}", line_index + 1))?);
    }

    Ok(records)
}

fn load_array(path: &Path, content: &str, limit: Option<usize>) -> EvalResult<Vec<Record>> {
    let value: Value = serde_json::from_str(content).map_err(|e| dataset_error(path, e.to_string()))?;
    let Value::Array(rows) = value else {
        return Err(dataset_error(path, "expected a JSON array of objects".to_string()));
    };

    rows.into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(index, row)| into_record(path, row, || format!("item {index}")))
        .collect()
}

fn into_record(path: &Path, value: Value, position: impl Fn() -> String) -> EvalResult<Record> {
    match value {
        Value::Object(fields) => Ok(Record::from_fields(fields)),
        other => Err(dataset_error(
            path,
            format!("{} is not an object: {other}", position()),
        )),
    }
}

fn dataset_error(path: &Path, message: String) -> EvalError {
    EvalError::Dataset {
        path: path.to_path_buf(),
        message,
    }
}
