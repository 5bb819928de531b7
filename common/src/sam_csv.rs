// CSV loader and writer for the SAM exchange files

use crate::errors::PipelineError;
use crate::models::{OutputRow, SourceRecord};
use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;
use tracing::{debug, instrument};

/// Header of the csv-file exported from SAM, in order
pub const INPUT_HEADER: [&str; 3] = ["jobLabel", "uniqueID", "oasDataJsonEncoded"];

/// Header of the csv-file re-imported into SAM, in order
pub const OUTPUT_HEADER: [&str; 7] = [
    "oasid",
    "thumbnail",
    "record_image",
    "record_type",
    "large_image",
    "web_document_url",
    "record_file",
];

/// Load all records of a SAM export. The header must match [`INPUT_HEADER`]
/// exactly; nothing is returned for a file with the wrong header.
#[instrument(fields(path = %path.display()))]
pub fn load_source_records(path: &Path) -> Result<Vec<SourceRecord>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::InputNotFound(path.to_path_buf()));
    }
    if !has_csv_extension(path) {
        return Err(PipelineError::WrongFileExtension(path.to_path_buf()));
    }

    let read_error = |e: csv::Error| PipelineError::CsvRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(read_error)?;

    let headers = reader.headers().map_err(read_error)?.clone();
    if !headers.iter().eq(INPUT_HEADER.iter().copied()) {
        return Err(PipelineError::MalformedHeader {
            expected: INPUT_HEADER.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    let mut records = Vec::new();
    for result in reader.deserialize::<SourceRecord>() {
        records.push(result.map_err(read_error)?);
    }

    debug!(count = records.len(), "Loaded source records");
    Ok(records)
}

/// Write the output rows with the fixed [`OUTPUT_HEADER`]. Absent fields are
/// written as empty strings.
#[instrument(skip(rows), fields(path = %path.display(), rows = rows.len()))]
pub fn write_output_rows(rows: &[OutputRow], path: &Path) -> Result<(), PipelineError> {
    let write_error = |reason: String| PipelineError::CsvWrite {
        path: path.to_path_buf(),
        reason,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| write_error(e.to_string()))?;

    writer
        .write_record(OUTPUT_HEADER)
        .map_err(|e| write_error(e.to_string()))?;

    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| write_error(e.to_string()))?;
    }

    writer.flush().map_err(|e| write_error(e.to_string()))?;

    debug!("Output csv-file written");
    Ok(())
}

pub(crate) fn has_csv_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}
