// Bootstrap utilities for the binary: settings and pipeline wiring

use crate::config::Settings;
use crate::converter::{FormatRegistry, MediaConverters};
use crate::models::RunOptions;
use crate::pipeline::{AccessFilePipeline, Workspace};
use crate::storage::{BlobUploader, S3BlobStore};
use crate::watermark::Watermarker;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load and validate settings, from `path` or the default location
#[tracing::instrument]
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from_path(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;

    settings
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(settings)
}

/// Whether the shared storage holding the master files is mounted
pub fn shared_storage_available(settings: &Settings) -> bool {
    std::env::var_os(&settings.paths.shared_storage_env).is_some()
}

/// Build the pipeline for one run. Logos are loaded only when watermarking,
/// the blob store client only when uploading.
#[tracing::instrument(skip(settings))]
pub fn init_pipeline(settings: &Settings, options: &RunOptions) -> Result<AccessFilePipeline> {
    let watermarker = if options.no_watermark {
        None
    } else {
        let marker =
            Watermarker::from_settings(settings).context("Failed to load watermark logos")?;
        Some(Arc::new(marker))
    };

    let uploader = if options.local {
        None
    } else {
        let store = S3BlobStore::new(&settings.storage).context("Failed to create blob store")?;
        Some(BlobUploader::new(Arc::new(store)))
    };

    let converters = MediaConverters::from_settings(settings, watermarker);
    let pipeline = AccessFilePipeline::new(
        FormatRegistry::from_config(&settings.formats),
        Arc::new(converters),
        uploader,
        &settings.storage,
    );

    info!(
        watermark = !options.no_watermark,
        upload = !options.local,
        "Pipeline initialized"
    );
    Ok(pipeline)
}

/// Resolve the run's directories
pub fn init_workspace(settings: &Settings, options: &RunOptions) -> Result<Workspace> {
    Workspace::prepare(settings, options, shared_storage_available(settings))
        .context("Failed to prepare workspace")
}
