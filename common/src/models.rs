use crate::errors::RecordError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Input Models
// ============================================================================

/// One row of the csv-file exported from SAM
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "jobLabel")]
    pub job_label: String,
    #[serde(rename = "uniqueID")]
    pub unique_id: String,
    #[serde(rename = "oasDataJsonEncoded")]
    pub metadata_json: String,
}

impl SourceRecord {
    /// Decode the embedded metadata
    pub fn metadata(&self) -> Result<RecordMetadata, RecordError> {
        Ok(serde_json::from_str(&self.metadata_json)?)
    }
}

/// The parts of a record's metadata the access-file workflow reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RecordMetadata {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub other_restrictions: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub contractual_status: Option<String>,
}

impl RecordMetadata {
    /// Filename of the digital master, if the record has one
    pub fn digital_file(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

// SAM exports codes as "2;Some label" but older rows carry bare numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

// ============================================================================
// Access File Models
// ============================================================================

/// Kind of master file, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Image,
    WebDocument,
    Video,
    Audio,
}

impl RecordType {
    /// Roles an access-file set of this type must contain
    pub fn roles(&self) -> &'static [AccessRole] {
        match self {
            RecordType::Image => &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::LargeImage,
            ],
            RecordType::WebDocument => &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::WebDocumentUrl,
            ],
            RecordType::Video => &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::RecordFile,
            ],
            RecordType::Audio => &[AccessRole::RecordFile],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Image => "image",
            RecordType::WebDocument => "web_document",
            RecordType::Video => "video",
            RecordType::Audio => "audio",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column an access file ends up in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessRole {
    Thumbnail,
    RecordImage,
    LargeImage,
    WebDocumentUrl,
    RecordFile,
}

/// A generated access file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessFile {
    pub role: AccessRole,
    pub path: PathBuf,
}

/// The local access files produced for one record. Built once by a converter
/// and consumed when the output row is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessFileSet {
    record_type: RecordType,
    files: Vec<AccessFile>,
}

impl AccessFileSet {
    /// Build a set, checking that exactly the roles of `record_type` are present
    pub fn new(record_type: RecordType, files: Vec<AccessFile>) -> Result<Self, String> {
        let expected = record_type.roles();
        let mut roles: Vec<AccessRole> = files.iter().map(|f| f.role).collect();
        roles.sort();
        let mut wanted = expected.to_vec();
        wanted.sort();
        if roles != wanted {
            return Err(format!(
                "{} access files must have roles {:?}, got {:?}",
                record_type, wanted, roles
            ));
        }
        Ok(Self { record_type, files })
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn files(&self) -> &[AccessFile] {
        &self.files
    }

    pub fn path(&self, role: AccessRole) -> Option<&Path> {
        self.files
            .iter()
            .find(|f| f.role == role)
            .map(|f| f.path.as_path())
    }

    /// Emit the output row, placing every file either locally or under `remote`
    pub fn into_row(self, oasid: &str, remote: Option<&RemotePrefix>) -> OutputRow {
        let mut row = OutputRow {
            oasid: oasid.to_string(),
            record_type: self.record_type,
            thumbnail: None,
            record_image: None,
            large_image: None,
            web_document_url: None,
            record_file: None,
        };

        for file in self.files {
            let location = match remote {
                Some(prefix) => AccessLocation::Remote(prefix.url_for(oasid, &file.path)),
                None => AccessLocation::Local(file.path),
            };
            let slot = match file.role {
                AccessRole::Thumbnail => &mut row.thumbnail,
                AccessRole::RecordImage => &mut row.record_image,
                AccessRole::LargeImage => &mut row.large_image,
                AccessRole::WebDocumentUrl => &mut row.web_document_url,
                AccessRole::RecordFile => &mut row.record_file,
            };
            *slot = Some(location);
        }

        row
    }
}

/// Where an access file can be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessLocation {
    Local(PathBuf),
    Remote(String),
}

impl AccessLocation {
    pub fn is_remote(&self) -> bool {
        matches!(self, AccessLocation::Remote(_))
    }
}

impl fmt::Display for AccessLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessLocation::Local(path) => write!(f, "{}", path.display()),
            AccessLocation::Remote(url) => f.write_str(url),
        }
    }
}

impl Serialize for AccessLocation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Public URL prefix of an upload target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePrefix {
    pub root_url: String,
    pub container: String,
}

impl RemotePrefix {
    pub fn new(root_url: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            container: container.into(),
        }
    }

    /// `{root}/{container}/{unique_id}/{filename}`. Filenames are id based,
    /// so no url-encoding is applied.
    pub fn url_for(&self, unique_id: &str, local: &Path) -> String {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!(
            "{}/{}/{}/{}",
            self.root_url.trim_end_matches('/'),
            self.container,
            unique_id,
            name
        )
    }
}

// ============================================================================
// Output Models
// ============================================================================

/// One row of the csv-file re-imported into SAM. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRow {
    pub oasid: String,
    pub thumbnail: Option<AccessLocation>,
    pub record_image: Option<AccessLocation>,
    pub record_type: RecordType,
    pub large_image: Option<AccessLocation>,
    pub web_document_url: Option<AccessLocation>,
    pub record_file: Option<AccessLocation>,
}

impl OutputRow {
    pub fn locations(&self) -> impl Iterator<Item = &AccessLocation> {
        [
            &self.thumbnail,
            &self.record_image,
            &self.large_image,
            &self.web_document_url,
            &self.record_file,
        ]
        .into_iter()
        .flatten()
    }
}

// ============================================================================
// Run Models
// ============================================================================

/// Flags of one access-file run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub no_watermark: bool,
    /// Do not upload the generated files
    pub local: bool,
    /// Replace existing local files and blobs
    pub overwrite: bool,
    /// Use the sandbox paths and the test container
    pub dryrun: bool,
}

/// Why a record produced no output without being an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoDigitalFile,
    LegalRestriction(i64),
    ContractualRestriction(i64),
    AlreadyConverted(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoDigitalFile => f.write_str("the metadata does not contain a digital file"),
            SkipReason::LegalRestriction(code) => write!(f, "legal restrictions (code {})", code),
            SkipReason::ContractualRestriction(code) => {
                write!(f, "contractual restrictions (code {})", code)
            }
            SkipReason::AlreadyConverted(path) => {
                write!(f, "{} already exists", path.display())
            }
        }
    }
}

/// Result of the upload stage for a converted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    NotRequested,
    Uploaded,
    Skipped,
    Failed(String),
}

/// Final state of one record
#[derive(Debug)]
pub enum RecordOutcome {
    Skipped(SkipReason),
    Failed(RecordError),
    Converted { row: OutputRow, upload: UploadStatus },
}

/// Aggregate counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub converted: usize,
    pub convert_skipped: usize,
    pub convert_errors: usize,
    pub uploaded: usize,
    pub upload_skipped: usize,
    pub upload_errors: usize,
}

impl RunCounters {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Skipped(_) => self.convert_skipped += 1,
            RecordOutcome::Failed(_) => self.convert_errors += 1,
            RecordOutcome::Converted { upload, .. } => {
                self.converted += 1;
                match upload {
                    UploadStatus::NotRequested => {}
                    UploadStatus::Uploaded => self.uploaded += 1,
                    UploadStatus::Skipped => self.upload_skipped += 1,
                    UploadStatus::Failed(_) => self.upload_errors += 1,
                }
            }
        }
    }

    /// Every record ended in exactly one conversion bucket
    pub fn is_partition_of(&self, total: usize) -> bool {
        self.converted + self.convert_skipped + self.convert_errors == total
    }
}
