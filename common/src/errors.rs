// Error handling framework
// One enum per concern: fatal run errors, per-record errors, converter,
// external process, upload and configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No csv-file at: {0}")]
    InputNotFound(PathBuf),

    #[error("The input-path is not pointing to a csv-file: {0}")]
    WrongFileExtension(PathBuf),

    #[error("Imported csv-file does not contain the right headers. Expected [{expected}], found [{found}]")]
    MalformedHeader { expected: String, found: String },

    #[error("Failed to read csv-file {path}: {reason}")]
    CsvRead { path: PathBuf, reason: String },

    #[error("Failed to write csv-file {path}: {reason}")]
    CsvWrite { path: PathBuf, reason: String },

    #[error("Path to master files does not exist: {0}")]
    MasterRootMissing(PathBuf),

    #[error("Shared storage is not available (environment variable '{variable}' is not set). Only dry runs are possible")]
    SharedStorageUnavailable { variable: String },

    #[error("Filesystem error at {path}: {reason}")]
    FileSystem { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Errors that fail a single record; the batch continues
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid metadata JSON: {0}")]
    InvalidMetadata(String),

    #[error("Malformed {field} code: '{value}'")]
    MalformedRestriction { field: &'static str, value: String },

    #[error("No file found at: {0}")]
    MasterMissing(PathBuf),

    #[error("Filepath refers to a directory: {0}")]
    MasterIsDirectory(PathBuf),

    #[error("Unable to handle the fileformat of {0}")]
    UnsupportedFormat(String),

    #[error("Failed to create output directory {path}: {reason}")]
    OutputDirectory { path: PathBuf, reason: String },

    #[error(transparent)]
    Conversion(#[from] ConvertError),
}

/// Converter adapter errors
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("File already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Input-path not a file: {0}")]
    SourceNotFound(PathBuf),

    #[error("Error opening file {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Error saving {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Unable to add watermark to {path}: {reason}")]
    Watermark { path: PathBuf, reason: String },

    #[error("Filesystem error at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Conversion task failed: {0}")]
    TaskFailed(String),
}

impl ConvertError {
    /// Output already present and overwrite not requested
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ConvertError::AlreadyExists(_))
    }
}

/// External tool invocation errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} failed (exit code {code:?}): {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {seconds} seconds")]
    Timeout { program: String, seconds: u64 },
}

/// Blob upload errors. Transport-specific errors are flattened into
/// `Transport` so callers never see the storage client's types.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("No such container exists: {0}")]
    ContainerNotFound(String),

    #[error("Blob already exists: {blob}")]
    AlreadyExists { blob: String },

    #[error("Source {0} is not a file")]
    SourceMissing(PathBuf),

    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Upload failed: {0}")]
    Transport(String),
}

impl UploadError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, UploadError::AlreadyExists { .. })
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(err: serde_json::Error) -> Self {
        RecordError::InvalidMetadata(err.to_string())
    }
}
