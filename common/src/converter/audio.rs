// Audio converter: re-encode to MP3, no thumbnails

use super::process::{run_tool, transcode_timeout};
use super::{ensure_absent, ensure_dir, ensure_output, ensure_source, file_set, ConversionJob};
use crate::config::ToolsConfig;
use crate::errors::ConvertError;
use crate::models::{AccessFileSet, AccessRole, RecordType};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

pub struct AudioConverter {
    ffmpeg: PathBuf,
    min_timeout_secs: u64,
}

impl AudioConverter {
    pub fn new(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            min_timeout_secs: tools.min_transcode_timeout_seconds,
        }
    }

    #[instrument(skip(self, job), fields(master = %job.master.display()))]
    pub async fn convert(&self, job: &ConversionJob) -> Result<AccessFileSet, ConvertError> {
        ensure_source(&job.master)?;
        ensure_dir(&job.out_dir).await?;

        let output = job.out_dir.join(format!("{}.mp3", job.unique_id));
        ensure_absent([&output], job.overwrite)?;

        let size = tokio::fs::metadata(&job.master)
            .await
            .map_err(|e| ConvertError::Io {
                path: job.master.clone(),
                reason: e.to_string(),
            })?
            .len();

        let args = audio_args(&job.master, &output);
        run_tool(
            &self.ffmpeg,
            &args,
            transcode_timeout(size, self.min_timeout_secs),
            &output,
        )
        .await?;
        ensure_output(&job.master, &output, "audio")?;
        debug!(output = %output.display(), "Audio transcoded");

        file_set(RecordType::Audio, &[AccessRole::RecordFile], vec![output])
    }
}

fn audio_args(master: &Path, output: &Path) -> Vec<String> {
    vec![
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        master.display().to_string(),
        "-acodec".into(),
        "libmp3lame".into(),
        output.display().to_string(),
    ]
}
