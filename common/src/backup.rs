// Backup search: find archive records by storage id in a SAM backup export

use crate::errors::PipelineError;
use crate::sam_csv::has_csv_extension;
use csv::{ReaderBuilder, WriterBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, instrument};

/// Header of a SAM backup csv-file, in order
pub const BACKUP_HEADER: [&str; 4] = ["id", "oasDictText", "timeStamp", "lastUser"];

/// `related_content` code marking a deleted record
const DELETED_CODE: &str = "4";

#[derive(Debug, Deserialize)]
struct BackupRow {
    #[serde(rename = "oasDictText")]
    dict_text: String,
}

/// Load the non-deleted records of a backup export
#[instrument(fields(path = %path.display()))]
pub fn load_backup(path: &Path) -> Result<Vec<Value>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    if !has_csv_extension(path) {
        return Err(PipelineError::WrongFileExtension(path.to_path_buf()));
    }

    let read_error = |reason: String| PipelineError::CsvRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| read_error(e.to_string()))?;

    let headers = reader.headers().map_err(|e| read_error(e.to_string()))?.clone();
    if !headers.iter().eq(BACKUP_HEADER.iter().copied()) {
        return Err(PipelineError::MalformedHeader {
            expected: BACKUP_HEADER.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut records = Vec::new();
    for (line, result) in reader.deserialize::<BackupRow>().enumerate() {
        let row = result.map_err(|e| read_error(e.to_string()))?;
        let data: Value = serde_json::from_str(&row.dict_text)
            .map_err(|e| read_error(format!("row {}: {}", line + 1, e)))?;
        if !is_deleted(&data) {
            records.push(data);
        }
    }
    Ok(records)
}

fn is_deleted(record: &Value) -> bool {
    record
        .get("related_content")
        .and_then(Value::as_str)
        .and_then(|s| s.split(';').next())
        .map(|code| code.trim() == DELETED_CODE)
        .unwrap_or(false)
}

/// Whether the record's `storage_id` holds `value`. Arrays match on an
/// element, strings on a `;`-separated token.
pub fn matches_storage_id(record: &Value, value: &str) -> bool {
    match record.get("storage_id") {
        Some(Value::Array(ids)) => ids.iter().any(|id| value_text(id).as_deref() == Some(value)),
        Some(Value::String(ids)) => ids.split(';').any(|id| id.trim() == value),
        Some(other) => value_text(other).as_deref() == Some(value),
        None => false,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Write the identifiers of all records with `storage_id` to `id_list` under
/// the header `id`. Returns the number of matches; nothing is written when
/// there are none.
#[instrument(fields(backup = %backup.display(), storage_id = %storage_id))]
pub fn search_backup(
    backup: &Path,
    id_list: &Path,
    storage_id: &str,
) -> Result<usize, PipelineError> {
    info!("Loading and parsing backup-file. It might take a while");
    let records = load_backup(backup)?;

    let ids: Vec<String> = records
        .iter()
        .filter(|record| matches_storage_id(record, storage_id))
        .filter_map(|record| record.get("identifier").and_then(value_text))
        .collect();

    if ids.is_empty() {
        info!("No records matched your filter");
        return Ok(0);
    }

    let write_error = |reason: String| PipelineError::CsvWrite {
        path: id_list.to_path_buf(),
        reason,
    };
    let mut writer = WriterBuilder::new()
        .from_path(id_list)
        .map_err(|e| write_error(e.to_string()))?;
    writer
        .write_record(["id"])
        .map_err(|e| write_error(e.to_string()))?;
    for id in &ids {
        writer
            .write_record([id])
            .map_err(|e| write_error(e.to_string()))?;
    }
    writer.flush().map_err(|e| write_error(e.to_string()))?;

    info!(
        count = ids.len(),
        path = %id_list.display(),
        "Found matching records, id-list saved"
    );
    Ok(ids.len())
}
