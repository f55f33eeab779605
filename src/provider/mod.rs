use anyhow::Context;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::Path;

use crate::job::{Job, JobId, StatusSource};
use crate::Result;

/// Default API endpoint for the ElevenLabs dubbing service
pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";

/// Parameters for one dubbing request
#[derive(Debug, Clone)]
pub struct DubParams {
    /// Target language code (for example "hi" or "ta")
    pub target_language: String,

    /// Ask the provider to watermark the dubbed audio (free-tier requirement)
    pub watermark: bool,
}

impl DubParams {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
            watermark: true,
        }
    }
}

/// Capability surface the dubbing pipeline consumes.
///
/// `StatusSource` is a supertrait so the waiter can poll the same client
/// that submitted the job.
#[async_trait]
pub trait DubbingProvider: StatusSource {
    /// Start a provider-side dubbing job for the given video file
    async fn submit(&self, input: &Path, params: &DubParams) -> Result<JobId>;

    /// Stream the dubbed artifact for a completed job into `dest`
    async fn fetch(&self, id: &JobId, language: &str, dest: &Path) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct DubbingSubmitResponse {
    dubbing_id: String,
}

#[derive(Debug, Deserialize)]
struct DubbingMetadata {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
}

/// reqwest-based client for the ElevenLabs dubbing API
pub struct ElevenLabsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl DubbingProvider for ElevenLabsClient {
    async fn submit(&self, input: &Path, params: &DubParams) -> Result<JobId> {
        let filename = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input.mp4".to_string());

        tracing::info!(
            "Submitting {} for dubbing into '{}'",
            input.display(),
            params.target_language
        );

        let content = fs_err::read(input)?;
        let file_part = reqwest::multipart::Part::bytes(content)
            .file_name(filename)
            .mime_str(video_mime(input))?;

        let form = reqwest::multipart::Form::new()
            .text("target_lang", params.target_language.clone())
            .text("watermark", params.watermark.to_string())
            .part("file", file_part);

        let response = self
            .http
            .post(self.endpoint("/v1/dubbing"))
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("Failed to submit dubbing job")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body).unwrap_or(body);
            anyhow::bail!("Dubbing submission rejected: HTTP {}: {}", status, detail);
        }

        let submitted: DubbingSubmitResponse = response
            .json()
            .await
            .context("Failed to parse dubbing submission response")?;

        Ok(JobId::new(submitted.dubbing_id))
    }

    async fn fetch(&self, id: &JobId, language: &str, dest: &Path) -> Result<()> {
        let url = self.endpoint(&format!(
            "/v1/dubbing/{}/audio/{}",
            id,
            urlencoding::encode(language)
        ));

        tracing::info!("Downloading dubbed artifact to: {}", dest.display());

        let response = self
            .http
            .get(url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .context("Failed to download dubbed artifact")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to download dubbed artifact: HTTP {}", response.status());
        }

        let total_size = response.content_length().unwrap_or(0);
        let progress = ProgressBar::new(total_size);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap(),
        );
        progress.set_message("Downloading dubbed video...");

        let mut file = fs_err::File::create(dest)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        use std::io::Write;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            progress.set_position(downloaded);
        }

        progress.finish_with_message("Download complete");

        Ok(())
    }
}

#[async_trait]
impl StatusSource for ElevenLabsClient {
    async fn fetch_status(&self, id: &JobId) -> Result<Job> {
        let response = self
            .http
            .get(self.endpoint(&format!("/v1/dubbing/{}", id)))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .context("Failed to get dubbing job status")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body).unwrap_or(body);
            anyhow::bail!("Failed to get dubbing job status: HTTP {}: {}", status, detail);
        }

        let metadata: DubbingMetadata = response
            .json()
            .await
            .context("Failed to parse dubbing job metadata")?;

        Ok(Job::from_provider(
            id.clone(),
            &metadata.status,
            metadata.error_message,
        ))
    }
}

/// Pull the human-readable message out of a provider error body.
///
/// ElevenLabs error bodies are JSON, either `{"detail": "..."}` or
/// `{"detail": {"status": ..., "message": "..."}}`.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    match &value["detail"] {
        serde_json::Value::String(s) => Some(s.clone()),
        detail => detail["message"].as_str().map(|s| s.to_string()),
    }
}

/// MIME type for a video file, judged by extension
fn video_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}
