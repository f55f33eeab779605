use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::Result;

/// Local media capabilities the pipeline relies on: artifact validation and
/// the final audio/video merge.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Check the file is readable and carries at least one video stream
    async fn validate(&self, path: &Path) -> Result<bool>;

    /// Check the file carries at least one audio stream
    async fn has_audio_track(&self, path: &Path) -> Result<bool>;

    /// Write `output` with the video stream of `video` and the audio track
    /// of `audio_source`
    async fn merge(&self, video: &Path, audio_source: &Path, output: &Path) -> Result<()>;
}

/// ffmpeg/ffprobe implementation
pub struct FfmpegProcessor {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegProcessor {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }

    /// List stream codec types ("video", "audio", ...) reported by ffprobe
    async fn probe_stream_types(&self, path: &Path) -> Result<Vec<String>> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type",
                "-of",
                "csv=p=0",
            ])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed for {}: {}", path.display(), error.trim());
        }

        let stdout = String::from_utf8(output.stdout)?;

        Ok(stdout
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

impl Default for FfmpegProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn validate(&self, path: &Path) -> Result<bool> {
        if let Err(e) = crate::utils::check_file_accessible(path) {
            tracing::warn!("{}", e);
            return Ok(false);
        }

        match self.probe_stream_types(path).await {
            Ok(streams) => Ok(streams.iter().any(|s| s == "video")),
            Err(e) => {
                tracing::warn!("Cannot read video file {}: {}", path.display(), e);
                Ok(false)
            }
        }
    }

    async fn has_audio_track(&self, path: &Path) -> Result<bool> {
        let streams = self.probe_stream_types(path).await?;
        Ok(streams.iter().any(|s| s == "audio"))
    }

    async fn merge(&self, video: &Path, audio_source: &Path, output: &Path) -> Result<()> {
        tracing::info!(
            "Merging audio of {} onto {} -> {}",
            audio_source.display(),
            video.display(),
            output.display()
        );

        let result = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio_source)
            .args([
                // Video stream from the original, audio from the dubbed file
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-shortest",
            ])
            .arg(output)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !result.status.success() {
            let error = String::from_utf8_lossy(&result.stderr);
            anyhow::bail!("ffmpeg merge failed: {}", error.trim());
        }

        Ok(())
    }
}
