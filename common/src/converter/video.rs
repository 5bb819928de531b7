// Video converter: web-friendly H.264/AAC copy plus frame thumbnails

use super::process::{run_tool, transcode_timeout};
use super::{
    ensure_absent, ensure_dir, ensure_output, ensure_source, file_set, ConversionJob,
    ThumbnailSpec,
};
use crate::config::ToolsConfig;
use crate::errors::ConvertError;
use crate::models::{AccessFileSet, AccessRole, RecordType};
use crate::watermark::Watermarker;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct VideoConverter {
    ffmpeg: PathBuf,
    quality: u8,
    frame_offset: Duration,
    frame_timeout: Duration,
    min_timeout_secs: u64,
    specs: Vec<ThumbnailSpec>,
    watermarker: Option<Arc<Watermarker>>,
}

impl VideoConverter {
    pub fn new(
        tools: &ToolsConfig,
        specs: Vec<ThumbnailSpec>,
        watermarker: Option<Arc<Watermarker>>,
    ) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            quality: tools.video_quality,
            frame_offset: Duration::from_secs(tools.frame_offset_seconds as u64),
            frame_timeout: Duration::from_secs(tools.thumbnail_timeout_seconds),
            min_timeout_secs: tools.min_transcode_timeout_seconds,
            specs,
            watermarker,
        }
    }

    #[instrument(skip(self, job), fields(master = %job.master.display()))]
    pub async fn convert(&self, job: &ConversionJob) -> Result<AccessFileSet, ConvertError> {
        ensure_source(&job.master)?;
        ensure_dir(&job.out_dir).await?;

        let stem = job.master_stem();
        let movie = job.out_dir.join(format!("{}.mp4", job.unique_id));
        let frames: Vec<PathBuf> = self
            .specs
            .iter()
            .map(|s| s.target(&job.out_dir, &stem))
            .collect();
        let mut targets = frames.clone();
        targets.push(movie.clone());
        ensure_absent(&targets, job.overwrite)?;

        self.transcode(&job.master, &movie).await?;

        let mut written = Vec::with_capacity(frames.len());
        for (spec, frame) in self.specs.iter().zip(&frames) {
            if let Err(e) = self.extract_frame(&job.master, spec, frame, job.watermark).await {
                written.push(movie);
                remove_all(&written).await;
                return Err(e);
            }
            written.push(frame.clone());
        }

        written.push(movie);
        file_set(
            RecordType::Video,
            &[
                AccessRole::Thumbnail,
                AccessRole::RecordImage,
                AccessRole::RecordFile,
            ],
            written,
        )
    }

    async fn transcode(&self, master: &Path, output: &Path) -> Result<(), ConvertError> {
        let size = tokio::fs::metadata(master)
            .await
            .map_err(|e| ConvertError::Io {
                path: master.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();
        let timeout = transcode_timeout(size, self.min_timeout_secs);

        let args = transcode_args(master, output, self.quality);
        run_tool(&self.ffmpeg, &args, timeout, output).await?;
        ensure_output(master, output, "transcoded video")?;
        debug!(output = %output.display(), "Video transcoded");
        Ok(())
    }

    async fn extract_frame(
        &self,
        master: &Path,
        spec: &ThumbnailSpec,
        output: &Path,
        watermark: bool,
    ) -> Result<(), ConvertError> {
        let args = frame_args(master, output, self.frame_offset, spec.size);
        run_tool(&self.ffmpeg, &args, self.frame_timeout, output).await?;
        // a seek past the end exits cleanly without writing a frame
        ensure_output(master, output, "frame thumbnail")?;

        if watermark {
            if let Some(marker) = self.watermarker.clone() {
                let path = output.to_path_buf();
                tokio::task::spawn_blocking(move || marker.apply_to_path(&path))
                    .await
                    .map_err(|e| ConvertError::TaskFailed(e.to_string()))??;
            }
        }
        Ok(())
    }
}

fn transcode_args(master: &Path, output: &Path, quality: u8) -> Vec<String> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        master.display().to_string(),
        "-crf".into(),
        quality.to_string(),
        "-movflags".into(),
        "+faststart".into(),
        "-vf".into(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
        "-vcodec".into(),
        "h264".into(),
        "-acodec".into(),
        "aac".into(),
        output.display().to_string(),
    ]
}

fn frame_args(master: &Path, output: &Path, offset: Duration, width: u32) -> Vec<String> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-ss".into(),
        format_offset(offset),
        "-i".into(),
        master.display().to_string(),
        "-vframes".into(),
        "1".into(),
        "-filter:v".into(),
        format!("scale={}:-2", width),
        output.display().to_string(),
    ]
}

/// `HH:MM:SS`
fn format_offset(offset: Duration) -> String {
    let secs = offset.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(Duration::from_secs(12)), "00:00:12");
        assert_eq!(format_offset(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn test_transcode_args_force_even_dimensions() {
        let args = transcode_args(Path::new("in.mov"), Path::new("out.mp4"), 30);
        assert_eq!(args.first().map(String::as_str), Some("-loglevel"));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "30"));
        assert!(args.contains(&"scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_frame_args_seek_before_input() {
        let args = frame_args(
            Path::new("in.mov"),
            Path::new("in_s.jpg"),
            Duration::from_secs(12),
            150,
        );
        let seek = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(seek < input);
        assert_eq!(args[seek + 1], "00:00:12");
        assert!(args.contains(&"scale=150:-2".to_string()));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, frame_branch: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        // the transcode touches its output; frames run `frame_branch`
        let tool = dir.join("ffmpeg");
        std::fs::write(
            &tool,
            format!(
                "#!/bin/sh\nfor last; do :; done\ncase \"$last\" in\n  *.mp4) touch \"$last\" ;;\n  *) {} ;;\nesac\n",
                frame_branch
            ),
        )
        .unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        tool
    }

    #[cfg(unix)]
    fn clip_job(dir: &Path) -> ConversionJob {
        let master = dir.join("clip.mov");
        std::fs::write(&master, b"video").unwrap();
        ConversionJob {
            unique_id: "000900".to_string(),
            master,
            out_dir: dir.join("access/000900"),
            temp_dir: dir.join("temp"),
            watermark: false,
            overwrite: false,
        }
    }

    #[cfg(unix)]
    fn clip_converter(tool: PathBuf) -> VideoConverter {
        let tools = ToolsConfig {
            ffmpeg: tool,
            ..crate::config::Settings::default().tools
        };
        VideoConverter::new(
            &tools,
            vec![ThumbnailSpec::new(150, "_s"), ThumbnailSpec::new(640, "_m")],
            None,
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_frame_removes_transcoded_movie() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_ffmpeg(dir.path(), "echo 'no frame' >&2; exit 1");
        let job = clip_job(dir.path());

        let err = clip_converter(tool).convert(&job).await.unwrap_err();
        assert!(matches!(err, ConvertError::Process(_)));
        assert!(!job.out_dir.join("000900.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frame_past_end_of_clip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // exits cleanly but never writes the frame
        let tool = fake_ffmpeg(dir.path(), "exit 0");
        let job = clip_job(dir.path());

        let err = clip_converter(tool).convert(&job).await.unwrap_err();

        assert!(matches!(err, ConvertError::Decode { .. }));
        assert!(!job.out_dir.join("000900.mp4").exists());
        assert!(!job.out_dir.join("clip_s.jpg").exists());
        assert!(!job.out_dir.join("clip_m.jpg").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_later_missing_frame_removes_earlier_frames() {
        let dir = tempfile::tempdir().unwrap();
        // only the small frame gets written
        let tool = fake_ffmpeg(dir.path(), "case \"$last\" in *_s.jpg) touch \"$last\" ;; esac");
        let job = clip_job(dir.path());

        let err = clip_converter(tool).convert(&job).await.unwrap_err();

        assert!(matches!(err, ConvertError::Decode { .. }));
        assert!(!job.out_dir.join("clip_s.jpg").exists());
        assert!(!job.out_dir.join("000900.mp4").exists());
    }
}
