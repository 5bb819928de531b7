// Converter adapters producing access files from master files
// Each adapter wraps one decoder or external tool; `MediaConverters`
// dispatches on the record type.

pub mod audio;
pub mod image;
pub mod pdf;
pub mod process;
pub mod video;

use crate::config::{FormatConfig, Settings};
use crate::errors::ConvertError;
use crate::models::{AccessFile, AccessFileSet, AccessRole, RecordType};
use crate::watermark::Watermarker;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use self::audio::AudioConverter;
pub use self::image::ImageConverter;
pub use self::pdf::PdfConverter;
pub use self::video::VideoConverter;

/// Everything an adapter needs to convert one record
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub unique_id: String,
    pub master: PathBuf,
    /// Per-record access directory
    pub out_dir: PathBuf,
    /// Run-scoped scratch directory
    pub temp_dir: PathBuf,
    pub watermark: bool,
    pub overwrite: bool,
}

impl ConversionJob {
    /// File stem of the master, used to name thumbnails
    pub fn master_stem(&self) -> String {
        self.master
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.unique_id.clone())
    }
}

/// One thumbnail size and the suffix appended to the file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailSpec {
    pub size: u32,
    pub suffix: String,
}

impl ThumbnailSpec {
    pub fn new(size: u32, suffix: impl Into<String>) -> Self {
        Self {
            size,
            suffix: suffix.into(),
        }
    }

    /// Small, medium and large thumbnails from the settings
    pub fn standard(settings: &Settings) -> Vec<ThumbnailSpec> {
        vec![
            ThumbnailSpec::new(settings.thumbnails.small, "_s"),
            ThumbnailSpec::new(settings.thumbnails.medium, "_m"),
            ThumbnailSpec::new(settings.thumbnails.large, "_l"),
        ]
    }

    /// `{out_dir}/{stem}{suffix}.jpg`
    pub fn target(&self, out_dir: &Path, stem: &str) -> PathBuf {
        out_dir.join(format!("{}{}.jpg", stem, self.suffix))
    }
}

/// Converts a master file of a known type into its access-file set
#[async_trait]
pub trait AccessConverter: Send + Sync {
    async fn convert(
        &self,
        record_type: RecordType,
        job: &ConversionJob,
    ) -> Result<AccessFileSet, ConvertError>;
}

/// Maps file extensions onto record types
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    image: HashSet<String>,
    video: HashSet<String>,
    audio: HashSet<String>,
}

impl FormatRegistry {
    pub fn from_config(config: &FormatConfig) -> Self {
        Self {
            image: parse_extensions(&config.image),
            video: parse_extensions(&config.video),
            audio: parse_extensions(&config.audio),
        }
    }

    /// Record type for a master file. PDFs are always web documents;
    /// comparison is case-insensitive.
    pub fn classify(&self, path: &Path) -> Option<RecordType> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let ext = format!(".{}", ext);
        if ext == ".pdf" {
            Some(RecordType::WebDocument)
        } else if self.audio.contains(&ext) {
            Some(RecordType::Audio)
        } else if self.video.contains(&ext) {
            Some(RecordType::Video)
        } else if self.image.contains(&ext) {
            Some(RecordType::Image)
        } else {
            None
        }
    }
}

fn parse_extensions(list: &str) -> HashSet<String> {
    list.split_whitespace()
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}

/// Fails with `AlreadyExists` for the first existing target unless
/// overwriting. Checked before any output is written so a refused run
/// leaves every existing file untouched.
pub(crate) fn ensure_absent<'a, I>(targets: I, overwrite: bool) -> Result<(), ConvertError>
where
    I: IntoIterator<Item = &'a PathBuf>,
{
    if overwrite {
        return Ok(());
    }
    for target in targets {
        if target.exists() {
            return Err(ConvertError::AlreadyExists(target.clone()));
        }
    }
    Ok(())
}

pub(crate) async fn ensure_dir(dir: &Path) -> Result<(), ConvertError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ConvertError::Io {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })
}

pub(crate) fn ensure_source(path: &Path) -> Result<(), ConvertError> {
    if !path.is_file() {
        return Err(ConvertError::SourceNotFound(path.to_path_buf()));
    }
    Ok(())
}

/// An external tool can exit cleanly without writing anything
pub(crate) fn ensure_output(master: &Path, output: &Path, what: &str) -> Result<(), ConvertError> {
    if !output.is_file() {
        return Err(ConvertError::Decode {
            path: master.to_path_buf(),
            reason: format!("no {} written to {}", what, output.display()),
        });
    }
    Ok(())
}

/// Pair role list and paths into an access-file set
pub(crate) fn file_set(
    record_type: RecordType,
    roles: &[AccessRole],
    paths: Vec<PathBuf>,
) -> Result<AccessFileSet, ConvertError> {
    if roles.len() != paths.len() {
        return Err(ConvertError::TaskFailed(format!(
            "expected {} access files for {}, got {}",
            roles.len(),
            record_type,
            paths.len()
        )));
    }
    let files = roles
        .iter()
        .zip(paths)
        .map(|(role, path)| AccessFile { role: *role, path })
        .collect();
    AccessFileSet::new(record_type, files).map_err(ConvertError::TaskFailed)
}

/// The production converter set
pub struct MediaConverters {
    image: ImageConverter,
    pdf: PdfConverter,
    video: VideoConverter,
    audio: AudioConverter,
}

impl MediaConverters {
    pub fn new(
        image: ImageConverter,
        pdf: PdfConverter,
        video: VideoConverter,
        audio: AudioConverter,
    ) -> Self {
        Self {
            image,
            pdf,
            video,
            audio,
        }
    }

    /// Build all adapters from the settings. `watermarker` is `None` when
    /// watermarking is disabled for the run.
    pub fn from_settings(settings: &Settings, watermarker: Option<Arc<Watermarker>>) -> Self {
        let standard = ThumbnailSpec::standard(settings);
        let small_medium: Vec<ThumbnailSpec> = standard.iter().take(2).cloned().collect();

        Self::new(
            ImageConverter::new(standard, watermarker.clone()),
            PdfConverter::new(
                settings.tools.pdftoppm.clone(),
                ImageConverter::new(small_medium.clone(), watermarker.clone()),
                settings.tools.min_transcode_timeout_seconds,
            ),
            VideoConverter::new(&settings.tools, small_medium, watermarker),
            AudioConverter::new(&settings.tools),
        )
    }
}

#[async_trait]
impl AccessConverter for MediaConverters {
    async fn convert(
        &self,
        record_type: RecordType,
        job: &ConversionJob,
    ) -> Result<AccessFileSet, ConvertError> {
        match record_type {
            RecordType::Image => self.image.convert(job).await,
            RecordType::WebDocument => self.pdf.convert(job).await,
            RecordType::Video => self.video.convert(job).await,
            RecordType::Audio => self.audio.convert(job).await,
        }
    }
}
