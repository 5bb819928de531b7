// Access-file pipeline
// Reads a SAM export, converts each publishable master file into access
// files, optionally uploads them and writes the re-import csv-file.

pub mod workspace;

pub use self::workspace::{TempDirGuard, Workspace};

use crate::config::StorageConfig;
use crate::converter::{AccessConverter, ConversionJob, FormatRegistry};
use crate::errors::{ConvertError, PipelineError, RecordError};
use crate::models::{
    AccessFileSet, OutputRow, RecordOutcome, RemotePrefix, RunCounters, RunOptions, SkipReason,
    SourceRecord, UploadStatus,
};
use crate::rights::{self, RightsDecision};
use crate::sam_csv::{load_source_records, write_output_rows};
use crate::storage::{BlobUploader, UploadItem};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, instrument, warn, Instrument};

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub total: usize,
    pub counters: RunCounters,
    pub rows_written: usize,
    /// The output csv-file, when any rows were produced
    pub output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct AccessFilePipeline {
    formats: FormatRegistry,
    converter: Arc<dyn AccessConverter>,
    uploader: Option<BlobUploader>,
    root_url: String,
    container: String,
    test_container: String,
}

impl AccessFilePipeline {
    /// `uploader` may be `None` for runs that never upload
    pub fn new(
        formats: FormatRegistry,
        converter: Arc<dyn AccessConverter>,
        uploader: Option<BlobUploader>,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            formats,
            converter,
            uploader,
            root_url: storage.root_url.clone(),
            container: storage.container.clone(),
            test_container: storage.test_container.clone(),
        }
    }

    fn container(&self, options: &RunOptions) -> &str {
        if options.dryrun {
            &self.test_container
        } else {
            &self.container
        }
    }

    /// Process every record of `csv_in` in order and write the converted rows
    /// to `csv_out`.
    ///
    /// Only problems with the input file, the scratch directory or the output
    /// file fail the run; each record's own failures are counted instead. The
    /// scratch directory is removed on every exit path.
    #[instrument(skip(self, options, workspace), fields(input = %csv_in.display()))]
    pub async fn run(
        &self,
        csv_in: &Path,
        csv_out: &Path,
        options: &RunOptions,
        workspace: &Workspace,
    ) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        info!(
            no_watermark = options.no_watermark,
            local = options.local,
            overwrite = options.overwrite,
            dryrun = options.dryrun,
            "Run flags"
        );

        let records = load_source_records(csv_in)?;
        let temp = TempDirGuard::create(&workspace.temp_dir)?;

        let total = records.len();
        let mut counters = RunCounters::default();
        let mut rows = Vec::new();

        for (index, record) in records.iter().enumerate() {
            info!("Processing {} of {}: {}", index + 1, total, display_name(record));

            let span = info_span!("record", unique_id = %record.unique_id);
            let outcome = self
                .process_record(record, options, workspace, temp.path())
                .instrument(span.clone())
                .await;
            span.in_scope(|| log_outcome(&outcome));

            counters.record(&outcome);
            if let RecordOutcome::Converted { row, .. } = outcome {
                rows.push(row);
            }
        }

        let output = if rows.is_empty() {
            info!("No new access files have been generated");
            None
        } else {
            write_output_rows(&rows, csv_out)?;
            info!(path = %csv_out.display(), rows = rows.len(), "Output csv-file written");
            Some(csv_out.to_path_buf())
        };

        let finished_at = Utc::now();
        info!(
            total,
            elapsed_secs = (finished_at - started_at).num_seconds(),
            converted = counters.converted,
            convert_skipped = counters.convert_skipped,
            convert_errors = counters.convert_errors,
            uploaded = counters.uploaded,
            upload_skipped = counters.upload_skipped,
            upload_errors = counters.upload_errors,
            "Finished generating access files"
        );

        Ok(RunReport {
            total,
            counters,
            rows_written: rows.len(),
            output,
            started_at,
            finished_at,
        })
    }

    /// Take one record through rights check, conversion and upload. Never
    /// fails: every problem becomes a skip or an error outcome.
    pub async fn process_record(
        &self,
        record: &SourceRecord,
        options: &RunOptions,
        workspace: &Workspace,
        temp_dir: &Path,
    ) -> RecordOutcome {
        let metadata = match record.metadata() {
            Ok(metadata) => metadata,
            Err(e) => return RecordOutcome::Failed(e),
        };
        let Some(filename) = metadata.digital_file() else {
            return RecordOutcome::Skipped(SkipReason::NoDigitalFile);
        };

        match rights::evaluate(&metadata) {
            Ok(RightsDecision::Pass) => {}
            Ok(RightsDecision::LegallyRestricted(code)) => {
                return RecordOutcome::Skipped(SkipReason::LegalRestriction(code))
            }
            Ok(RightsDecision::ContractuallyRestricted(code)) => {
                return RecordOutcome::Skipped(SkipReason::ContractualRestriction(code))
            }
            Err(e) => return RecordOutcome::Failed(e),
        }

        let master = workspace.master_root.join(filename);
        if !master.exists() {
            return RecordOutcome::Failed(RecordError::MasterMissing(master));
        }
        if master.is_dir() {
            return RecordOutcome::Failed(RecordError::MasterIsDirectory(master));
        }

        let Some(record_type) = self.formats.classify(&master) else {
            return RecordOutcome::Failed(RecordError::UnsupportedFormat(filename.to_string()));
        };

        let out_dir = workspace.access_root.join(&record.unique_id);
        if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
            return RecordOutcome::Failed(RecordError::OutputDirectory {
                path: out_dir,
                reason: e.to_string(),
            });
        }

        let job = ConversionJob {
            unique_id: record.unique_id.clone(),
            master,
            out_dir,
            temp_dir: temp_dir.to_path_buf(),
            watermark: !options.no_watermark,
            overwrite: options.overwrite,
        };

        let files = match self.converter.convert(record_type, &job).await {
            Ok(files) => files,
            Err(ConvertError::AlreadyExists(path)) => {
                return RecordOutcome::Skipped(SkipReason::AlreadyConverted(path))
            }
            Err(e) => return RecordOutcome::Failed(RecordError::Conversion(e)),
        };

        if options.local {
            return RecordOutcome::Converted {
                row: files.into_row(&record.unique_id, None),
                upload: UploadStatus::NotRequested,
            };
        }

        let (row, upload) = self.publish(&record.unique_id, files, options).await;
        RecordOutcome::Converted { row, upload }
    }

    /// Upload the access files. A failed upload keeps the local paths in the row.
    async fn publish(
        &self,
        unique_id: &str,
        files: AccessFileSet,
        options: &RunOptions,
    ) -> (OutputRow, UploadStatus) {
        let Some(uploader) = &self.uploader else {
            return (
                files.into_row(unique_id, None),
                UploadStatus::Failed("no blob store configured".to_string()),
            );
        };

        let container = self.container(options);
        let items: Vec<UploadItem> = files
            .files()
            .iter()
            .map(|f| UploadItem::for_record(unique_id, f.path.clone()))
            .collect();

        match uploader.upload(container, &items, options.overwrite).await {
            Ok(()) => {
                let prefix = RemotePrefix::new(self.root_url.as_str(), container);
                (files.into_row(unique_id, Some(&prefix)), UploadStatus::Uploaded)
            }
            Err(e) if e.is_already_exists() && !options.overwrite => {
                (files.into_row(unique_id, None), UploadStatus::Skipped)
            }
            Err(e) => (
                files.into_row(unique_id, None),
                UploadStatus::Failed(e.to_string()),
            ),
        }
    }
}

fn display_name(record: &SourceRecord) -> String {
    record
        .metadata()
        .ok()
        .and_then(|m| m.digital_file().map(str::to_string))
        .unwrap_or_else(|| record.unique_id.clone())
}

fn log_outcome(outcome: &RecordOutcome) {
    match outcome {
        RecordOutcome::Skipped(reason) => info!("Skipping due to {}", reason),
        RecordOutcome::Failed(e) => error!(error = %e, "Failed to generate access files"),
        RecordOutcome::Converted { row, upload } => match upload {
            UploadStatus::NotRequested => info!(record_type = %row.record_type, "Access files generated"),
            UploadStatus::Uploaded => info!(record_type = %row.record_type, "Access files generated and uploaded"),
            UploadStatus::Skipped => warn!("Access files already uploaded, keeping local paths"),
            UploadStatus::Failed(reason) => error!(error = %reason, "Upload failed, keeping local paths"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatConfig, Settings};
    use crate::models::{AccessFile, AccessLocation, RecordType};
    use async_trait::async_trait;

    /// Writes one small file per role named after the unique id
    struct TouchConverter;

    #[async_trait]
    impl AccessConverter for TouchConverter {
        async fn convert(
            &self,
            record_type: RecordType,
            job: &ConversionJob,
        ) -> Result<AccessFileSet, ConvertError> {
            let mut files = Vec::new();
            for role in record_type.roles() {
                let path = job.out_dir.join(format!("{}_{:?}.bin", job.unique_id, role));
                if path.exists() && !job.overwrite {
                    return Err(ConvertError::AlreadyExists(path));
                }
                std::fs::write(&path, b"x").unwrap();
                files.push(AccessFile { role: *role, path });
            }
            Ok(AccessFileSet::new(record_type, files).unwrap())
        }
    }

    fn pipeline() -> AccessFilePipeline {
        let formats = FormatRegistry::from_config(&FormatConfig {
            image: ".jpg .tif".to_string(),
            video: ".mov".to_string(),
            audio: ".wav".to_string(),
        });
        AccessFilePipeline::new(
            formats,
            Arc::new(TouchConverter),
            None,
            &Settings::default().storage,
        )
    }

    fn workspace(root: &Path) -> Workspace {
        let workspace = Workspace {
            master_root: root.join("masters"),
            access_root: root.join("access"),
            temp_dir: root.join("temp"),
        };
        std::fs::create_dir_all(&workspace.master_root).unwrap();
        workspace
    }

    fn record(id: &str, metadata: &str) -> SourceRecord {
        SourceRecord {
            job_label: "job".to_string(),
            unique_id: id.to_string(),
            metadata_json: metadata.to_string(),
        }
    }

    fn local() -> RunOptions {
        RunOptions {
            local: true,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn test_record_without_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let outcome = pipeline()
            .process_record(&record("1", "{}"), &local(), &ws, &ws.temp_dir)
            .await;
        assert!(matches!(outcome, RecordOutcome::Skipped(SkipReason::NoDigitalFile)));
    }

    #[tokio::test]
    async fn test_restricted_record_is_skipped_before_path_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        let outcome = pipeline()
            .process_record(
                &record("1", r#"{"filename": "missing.pdf", "other_restrictions": "2;Restricted"}"#),
                &local(),
                &ws,
                &ws.temp_dir,
            )
            .await;
        assert!(matches!(
            outcome,
            RecordOutcome::Skipped(SkipReason::LegalRestriction(2))
        ));
    }

    #[tokio::test]
    async fn test_master_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        std::fs::create_dir_all(ws.master_root.join("folder.jpg")).unwrap();
        let outcome = pipeline()
            .process_record(
                &record(
                    "1",
                    r#"{"filename": "folder.jpg", "other_restrictions": "1", "contractual_status": "3"}"#,
                ),
                &local(),
                &ws,
                &ws.temp_dir,
            )
            .await;
        assert!(matches!(
            outcome,
            RecordOutcome::Failed(RecordError::MasterIsDirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_format_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        std::fs::write(ws.master_root.join("notes.docx"), b"x").unwrap();
        let outcome = pipeline()
            .process_record(
                &record(
                    "1",
                    r#"{"filename": "notes.docx", "other_restrictions": 1, "contractual_status": 4}"#,
                ),
                &local(),
                &ws,
                &ws.temp_dir,
            )
            .await;
        assert!(matches!(
            outcome,
            RecordOutcome::Failed(RecordError::UnsupportedFormat(_))
        ));
        let mut counters = RunCounters::default();
        counters.record(&outcome);
        assert_eq!((counters.convert_errors, counters.convert_skipped), (1, 0));
        assert!(!ws.access_root.join("1").exists());
    }

    #[tokio::test]
    async fn test_second_conversion_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        std::fs::write(ws.master_root.join("a.wav"), b"x").unwrap();
        let rec = record(
            "7",
            r#"{"filename": "a.wav", "other_restrictions": "1", "contractual_status": "3"}"#,
        );
        let pipeline = pipeline();

        let first = pipeline.process_record(&rec, &local(), &ws, &ws.temp_dir).await;
        match first {
            RecordOutcome::Converted { row, upload } => {
                assert_eq!(upload, UploadStatus::NotRequested);
                assert_eq!(row.record_type, RecordType::Audio);
                assert!(matches!(row.record_file, Some(AccessLocation::Local(_))));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let second = pipeline.process_record(&rec, &local(), &ws, &ws.temp_dir).await;
        assert!(matches!(
            second,
            RecordOutcome::Skipped(SkipReason::AlreadyConverted(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_without_store_keeps_local_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(dir.path());
        std::fs::write(ws.master_root.join("a.jpg"), b"x").unwrap();
        let rec = record(
            "8",
            r#"{"filename": "a.jpg", "other_restrictions": "1", "contractual_status": "3"}"#,
        );

        let outcome = pipeline()
            .process_record(&rec, &RunOptions::default(), &ws, &ws.temp_dir)
            .await;
        match outcome {
            RecordOutcome::Converted { row, upload } => {
                assert!(matches!(upload, UploadStatus::Failed(_)));
                assert!(row.locations().all(|l| !l.is_remote()));
                assert!(row.large_image.is_some());
                assert_eq!(
                    row.locations().count(),
                    RecordType::Image.roles().len()
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
