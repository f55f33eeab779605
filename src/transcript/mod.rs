use anyhow::Context;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;

use crate::utils::validate_url;
use crate::Result;

/// Fetches YouTube auto-generated subtitles via yt-dlp and cleans them into
/// plain text.
///
/// The subtitle file is written into a private temp directory that is
/// removed together with its contents when the fetch returns.
pub struct TranscriptFetcher {
    yt_dlp_path: String,
}

impl TranscriptFetcher {
    pub fn new() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
        }
    }

    /// Fetch the transcript for a video URL as a single cleaned string
    pub async fn fetch(&self, url: &str) -> Result<String> {
        validate_url(url)?;

        let work_dir = TempDir::new().context("Failed to create temporary directory")?;

        tracing::info!("Fetching subtitles for: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--write-auto-sub",
                "--convert-subs",
                "srt",
                "--skip-download",
                "--output",
                "transcript.%(ext)s",
                url,
            ])
            .current_dir(work_dir.path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let srt_path = find_srt_file(work_dir.path())?
            .ok_or_else(|| anyhow::anyhow!("No transcript file was generated for {}", url))?;

        let content = fs_err::read_to_string(&srt_path)?;

        Ok(clean_srt(&content))
    }
}

impl Default for TranscriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn find_srt_file(dir: &std::path::Path) -> Result<Option<PathBuf>> {
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("srt") {
            return Ok(Some(path));
        }
    }

    Ok(None)
}

/// Strip SRT structure down to the spoken text: sequence numbers, timestamp
/// lines, and blank lines are dropped, the rest joined on single spaces.
pub fn clean_srt(content: &str) -> String {
    content
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains("-->"))
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}
