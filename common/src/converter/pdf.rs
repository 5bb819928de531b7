// PDF converter: first-page thumbnails plus a verbatim copy of the document

use super::image::ImageConverter;
use super::process::run_tool;
use super::{ensure_absent, ensure_dir, ensure_output, ensure_source, file_set, ConversionJob};
use crate::errors::ConvertError;
use crate::models::{AccessFileSet, AccessRole, RecordType};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// PDF points per inch; rasterising at this resolution keeps the page size
const NATIVE_DPI: &str = "72";

pub struct PdfConverter {
    pdftoppm: PathBuf,
    images: ImageConverter,
    timeout: Duration,
}

impl PdfConverter {
    pub fn new(pdftoppm: PathBuf, images: ImageConverter, timeout_secs: u64) -> Self {
        Self {
            pdftoppm,
            images,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// `{out_dir}/{unique_id}_c.pdf`
    pub fn copy_target(job: &ConversionJob) -> PathBuf {
        job.out_dir.join(format!("{}_c.pdf", job.unique_id))
    }

    #[instrument(skip(self, job), fields(master = %job.master.display()))]
    pub async fn convert(&self, job: &ConversionJob) -> Result<AccessFileSet, ConvertError> {
        ensure_source(&job.master)?;
        ensure_dir(&job.out_dir).await?;

        let stem = job.master_stem();
        let copy = Self::copy_target(job);
        let mut targets = self.images.targets(&job.out_dir, &stem);
        targets.push(copy.clone());
        ensure_absent(&targets, job.overwrite)?;

        let page = self.rasterize_first_page(&job.master, &job.temp_dir).await?;
        let thumbnails = self
            .images
            .thumbnails_as(&page, &job.out_dir, &stem, job.watermark, job.overwrite)
            .await;
        discard(&page).await;
        let mut paths = thumbnails?;

        if let Err(e) = tokio::fs::copy(&job.master, &copy).await {
            for path in &paths {
                discard(path).await;
            }
            return Err(ConvertError::Io {
                path: copy,
                reason: e.to_string(),
            });
        }
        debug!(copy = %copy.display(), "Document copied");

        paths.push(copy);
        file_set(
            RecordType::WebDocument,
            &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::WebDocumentUrl,
            ],
            paths,
        )
    }

    /// Render page one to `{temp_dir}/{uuid}.png`
    async fn rasterize_first_page(
        &self,
        master: &Path,
        temp_dir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        ensure_dir(temp_dir).await?;
        let prefix = temp_dir.join(Uuid::new_v4().to_string());
        let page = prefix.with_extension("png");

        let args: [&OsStr; 10] = [
            OsStr::new("-f"),
            OsStr::new("1"),
            OsStr::new("-l"),
            OsStr::new("1"),
            OsStr::new("-r"),
            OsStr::new(NATIVE_DPI),
            OsStr::new("-png"),
            OsStr::new("-singlefile"),
            master.as_os_str(),
            prefix.as_os_str(),
        ];
        run_tool(&self.pdftoppm, args, self.timeout, &page).await?;

        ensure_output(master, &page, "page image")?;
        Ok(page)
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::converter::ThumbnailSpec;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in rasterizer: copies a prepared PNG to `{prefix}.png`
    fn fake_pdftoppm(dir: &Path, page: &Path) -> PathBuf {
        let script = dir.join("pdftoppm");
        let body = format!(
            "#!/bin/sh\nfor last; do :; done\ncp {} \"$last.png\"\n",
            page.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn job(dir: &Path, overwrite: bool) -> ConversionJob {
        ConversionJob {
            unique_id: "000777".to_string(),
            master: dir.join("report.pdf"),
            out_dir: dir.join("access/000777"),
            temp_dir: dir.join("temp"),
            watermark: false,
            overwrite,
        }
    }

    fn converter(dir: &Path) -> PdfConverter {
        let page = dir.join("page.png");
        RgbImage::from_pixel(600, 800, Rgb([200, 200, 200]))
            .save_with_format(&page, ImageFormat::Png)
            .unwrap();
        let images = ImageConverter::new(
            vec![ThumbnailSpec::new(150, "_s"), ThumbnailSpec::new(640, "_m")],
            None,
        );
        PdfConverter::new(fake_pdftoppm(dir, &page), images, 10)
    }

    #[tokio::test]
    async fn test_pdf_produces_thumbnails_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.4 body").unwrap();
        let job = job(dir.path(), false);

        let set = converter(dir.path()).convert(&job).await.unwrap();

        assert_eq!(set.record_type(), RecordType::WebDocument);
        let thumb = set.path(AccessRole::Thumbnail).unwrap();
        assert_eq!(thumb, job.out_dir.join("report_s.jpg"));
        let medium = image::open(set.path(AccessRole::RecordImage).unwrap()).unwrap();
        assert_eq!((medium.width(), medium.height()), (480, 640));
        let copy = set.path(AccessRole::WebDocumentUrl).unwrap();
        assert_eq!(copy, job.out_dir.join("000777_c.pdf"));
        assert_eq!(std::fs::read(copy).unwrap(), b"%PDF-1.4 body");
        // rasterized page is scratch only
        assert_eq!(std::fs::read_dir(&job.temp_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_copy_blocks_whole_conversion() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.4 new").unwrap();
        let job = job(dir.path(), false);
        std::fs::create_dir_all(&job.out_dir).unwrap();
        std::fs::write(PdfConverter::copy_target(&job), b"old").unwrap();

        let err = converter(dir.path()).convert(&job).await.unwrap_err();

        assert!(err.is_already_exists());
        assert!(!job.out_dir.join("report_s.jpg").exists());
        assert_eq!(std::fs::read(PdfConverter::copy_target(&job)).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_copy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"%PDF-1.4 new").unwrap();
        let job = job(dir.path(), true);
        std::fs::create_dir_all(&job.out_dir).unwrap();
        std::fs::write(PdfConverter::copy_target(&job), b"old").unwrap();

        converter(dir.path()).convert(&job).await.unwrap();
        assert_eq!(
            std::fs::read(PdfConverter::copy_target(&job)).unwrap(),
            b"%PDF-1.4 new"
        );
    }
}
