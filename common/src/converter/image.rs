// Image converter: JPEG thumbnails of still images

use super::{ensure_absent, ensure_dir, ensure_source, file_set, ConversionJob, ThumbnailSpec};
use crate::errors::ConvertError;
use crate::models::{AccessFileSet, AccessRole, RecordType};
use crate::watermark::Watermarker;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageBuffer, ImageDecoder, ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct ImageConverter {
    specs: Vec<ThumbnailSpec>,
    watermarker: Option<Arc<Watermarker>>,
}

impl ImageConverter {
    pub fn new(specs: Vec<ThumbnailSpec>, watermarker: Option<Arc<Watermarker>>) -> Self {
        Self { specs, watermarker }
    }

    pub fn specs(&self) -> &[ThumbnailSpec] {
        &self.specs
    }

    /// Small, medium and large thumbnails of the master image
    #[instrument(skip(self, job), fields(master = %job.master.display()))]
    pub async fn convert(&self, job: &ConversionJob) -> Result<AccessFileSet, ConvertError> {
        let paths = self
            .thumbnails(&job.master, &job.out_dir, job.watermark, job.overwrite)
            .await?;
        file_set(
            RecordType::Image,
            &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::LargeImage,
            ],
            paths,
        )
    }

    /// Write one thumbnail per spec, named after the source stem.
    pub async fn thumbnails(
        &self,
        source: &Path,
        out_dir: &Path,
        watermark: bool,
        overwrite: bool,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.thumbnails_as(source, out_dir, &stem, watermark, overwrite)
            .await
    }

    /// Thumbnail paths for `stem` in `out_dir`, one per spec
    pub fn targets(&self, out_dir: &Path, stem: &str) -> Vec<PathBuf> {
        self.specs.iter().map(|s| s.target(out_dir, stem)).collect()
    }

    /// Like [`ImageConverter::thumbnails`] with an explicit file stem, for
    /// sources living under a scratch name.
    pub async fn thumbnails_as(
        &self,
        source: &Path,
        out_dir: &Path,
        stem: &str,
        watermark: bool,
        overwrite: bool,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        ensure_source(source)?;
        ensure_dir(out_dir).await?;

        let targets = self.targets(out_dir, stem);
        ensure_absent(&targets, overwrite)?;

        let converter = self.clone();
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let img = open_master(&source)?;
            converter.render(&img, &targets, watermark)
        })
        .await
        .map_err(|e| ConvertError::TaskFailed(e.to_string()))?
    }

    /// Resize `img` once per spec and save to the matching target
    pub(crate) fn render(
        &self,
        img: &DynamicImage,
        targets: &[PathBuf],
        watermark: bool,
    ) -> Result<Vec<PathBuf>, ConvertError> {
        let mut written = Vec::with_capacity(targets.len());
        for (spec, target) in self.specs.iter().zip(targets) {
            let mut thumb = fit_within(img, spec.size).to_rgb8();

            if watermark {
                if let Some(marker) = &self.watermarker {
                    marker.apply(&mut thumb);
                }
            }

            if let Err(e) = thumb.save_with_format(target, ImageFormat::Jpeg) {
                discard_all(&written);
                return Err(ConvertError::Encode {
                    path: target.clone(),
                    reason: e.to_string(),
                });
            }

            debug!(path = %target.display(), width = thumb.width(), height = thumb.height(), "Thumbnail written");
            written.push(target.clone());
        }
        Ok(written)
    }
}

/// Remove the thumbnails of a failed render so a rerun starts clean
fn discard_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove thumbnail");
        }
    }
}

/// Decode a master image, correcting EXIF rotation and reducing 16-bit
/// channels to 8 bits.
pub fn open_master(path: &Path) -> Result<DynamicImage, ConvertError> {
    let decode_error = |reason: String| ConvertError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let mut decoder = ImageReader::open(path)
        .map_err(|e| decode_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .into_decoder()
        .map_err(|e| decode_error(e.to_string()))?;

    // Formats without EXIF report no transform
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let img = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(e.to_string()))?;

    let img = apply_rotation(img, orientation);
    normalize_high_depth(img).map_err(decode_error)
}

/// Only the pure rotations (EXIF 3, 6 and 8) are corrected
pub fn apply_rotation(img: DynamicImage, orientation: Orientation) -> DynamicImage {
    match orientation {
        Orientation::Rotate180 => img.rotate180(),
        Orientation::Rotate90 => img.rotate90(),
        Orientation::Rotate270 => img.rotate270(),
        _ => img,
    }
}

/// Scale 16-bit samples by the image's own range: every sample is divided by
/// `max / 256`, so the brightest sample lands near 255 instead of the fixed
/// 65535 → 255 mapping that turns dark scans black.
pub fn normalize_high_depth(img: DynamicImage) -> Result<DynamicImage, String> {
    let (width, height) = (img.width(), img.height());
    let rebuilt = match img {
        DynamicImage::ImageLuma16(buf) => ImageBuffer::from_raw(width, height, scale_samples(buf.as_raw()))
            .map(DynamicImage::ImageLuma8),
        DynamicImage::ImageLumaA16(buf) => {
            ImageBuffer::from_raw(width, height, scale_samples(buf.as_raw()))
                .map(DynamicImage::ImageLumaA8)
        }
        DynamicImage::ImageRgb16(buf) => ImageBuffer::from_raw(width, height, scale_samples(buf.as_raw()))
            .map(DynamicImage::ImageRgb8),
        DynamicImage::ImageRgba16(buf) => {
            ImageBuffer::from_raw(width, height, scale_samples(buf.as_raw()))
                .map(DynamicImage::ImageRgba8)
        }
        other => return Ok(other),
    };
    rebuilt.ok_or_else(|| "16-bit sample buffer has unexpected length".to_string())
}

fn scale_samples(samples: &[u16]) -> Vec<u8> {
    let max = samples.iter().copied().max().unwrap_or(0);
    let divisor = (max / 256).max(1);
    samples
        .iter()
        .map(|&v| (v / divisor).min(255) as u8)
        .collect()
}

/// Fit inside a `size`×`size` box keeping the aspect ratio; never enlarges
pub fn fit_within(img: &DynamicImage, size: u32) -> DynamicImage {
    if img.width() <= size && img.height() <= size {
        return img.clone();
    }
    img.resize(size, size, FilterType::Lanczos3)
}
