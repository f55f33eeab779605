use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tempfile::TempDir;
use uuid::Uuid;

use crate::job::{JobWaiter, WaitOutcome};
use crate::media::MediaProcessor;
use crate::provider::{DubParams, DubbingProvider};
use crate::utils::sanitize_filename;
use crate::{PipelineError, Result};

const CLEANUP_ATTEMPTS: u32 = 3;
const CLEANUP_BACKOFF: Duration = Duration::from_secs(1);

/// Files created and owned by one pipeline run.
///
/// Every registered path is deleted exactly once when the run finishes,
/// regardless of outcome. Removal is retried a few times with a fixed
/// backoff (files can be briefly locked right after a download); a path
/// that still cannot be removed is logged and abandoned, never escalated.
#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    /// Register a path before the file is written, so a crash mid-write
    /// cannot leak it
    pub fn register(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every registered file, draining the registry
    pub async fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            if !path.exists() {
                continue;
            }

            for attempt in 1..=CLEANUP_ATTEMPTS {
                match fs_err::remove_file(&path) {
                    Ok(()) => {
                        tracing::debug!("Removed temporary file: {}", path.display());
                        break;
                    }
                    Err(e) if attempt < CLEANUP_ATTEMPTS => {
                        tracing::debug!(
                            "Retrying removal of {} ({}): {}",
                            path.display(),
                            attempt,
                            e
                        );
                        tokio::time::sleep(CLEANUP_BACKOFF).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to remove {} after {} attempts: {}",
                            path.display(),
                            CLEANUP_ATTEMPTS,
                            e
                        );
                    }
                }
            }
        }
    }
}

impl Drop for TempArtifacts {
    /// Last resort for cancelled runs: single-attempt synchronous removal
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!("Failed to remove {} on drop: {}", path.display(), e);
                }
            }
        }
    }
}

/// Outcome of dubbing a directory of clips
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, PipelineError)>,
}

impl BatchSummary {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// Owns one artifact-transform request end-to-end: submit, wait, download,
/// merge, and guaranteed cleanup of intermediates on every exit path.
pub struct DubbingPipeline {
    provider: Arc<dyn DubbingProvider>,
    media: Arc<dyn MediaProcessor>,
    waiter: JobWaiter,
    temp_dir: TempDir,
    output_dir: PathBuf,
}

impl DubbingPipeline {
    pub fn new(
        provider: Arc<dyn DubbingProvider>,
        media: Arc<dyn MediaProcessor>,
        waiter: JobWaiter,
        output_dir: PathBuf,
    ) -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;

        Ok(Self {
            provider,
            media,
            waiter,
            temp_dir,
            output_dir,
        })
    }

    /// Directory holding this pipeline's intermediate downloads
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Dub a single video into the target language.
    ///
    /// On success returns the final artifact path under the output
    /// directory; on failure returns a typed error and leaves no partial
    /// artifact or temp file behind.
    pub async fn run(
        &self,
        input: &Path,
        params: &DubParams,
    ) -> std::result::Result<PathBuf, PipelineError> {
        let mut temp = TempArtifacts::default();
        let result = self.run_inner(input, params, &mut temp).await;
        temp.cleanup().await;
        result
    }

    async fn run_inner(
        &self,
        input: &Path,
        params: &DubParams,
        temp: &mut TempArtifacts,
    ) -> std::result::Result<PathBuf, PipelineError> {
        // Fail fast before anything is submitted
        let valid = self
            .media
            .validate(input)
            .await
            .map_err(|e| PipelineError::InvalidInput(format!("{:#}", e)))?;

        if !valid {
            return Err(PipelineError::InvalidInput(format!(
                "{} is not a readable video file",
                input.display()
            )));
        }

        let job_id = self
            .provider
            .submit(input, params)
            .await
            .map_err(|e| PipelineError::SubmissionFailed(format!("{:#}", e)))?;

        tracing::info!("Dubbing job {} submitted for {}", job_id, input.display());

        match self.waiter.wait(self.provider.as_ref(), &job_id).await {
            Ok(WaitOutcome::Success) => {}
            Ok(WaitOutcome::Failed(reason)) => return Err(PipelineError::JobFailed(reason)),
            Ok(WaitOutcome::TimedOut) => {
                return Err(PipelineError::JobTimedOut {
                    attempts: self.waiter.max_attempts(),
                })
            }
            // Transport failure on the status check itself; fatal, no retry
            Err(e) => {
                return Err(PipelineError::JobFailed(format!(
                    "status check failed: {:#}",
                    e
                )))
            }
        }

        // Registered before the download starts so a partially written file
        // is covered by cleanup too
        let dubbed_path = self.temp_path(input);
        temp.register(dubbed_path.clone());

        self.provider
            .fetch(&job_id, &params.target_language, &dubbed_path)
            .await
            .map_err(|e| PipelineError::DownloadInvalid(format!("download failed: {:#}", e)))?;

        let has_audio = self
            .media
            .has_audio_track(&dubbed_path)
            .await
            .map_err(|e| PipelineError::DownloadInvalid(format!("{:#}", e)))?;

        if !has_audio {
            return Err(PipelineError::DownloadInvalid(format!(
                "dubbed artifact for {} has no audio track",
                input.display()
            )));
        }

        fs_err::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::MergeFailed(e.to_string()))?;

        let output_path = self.output_path(input);

        self.media
            .merge(input, &dubbed_path, &output_path)
            .await
            .map_err(|e| PipelineError::MergeFailed(format!("{:#}", e)))?;

        tracing::info!("Dubbed video saved to {}", output_path.display());

        Ok(output_path)
    }

    /// Dub every video file in a directory, a bounded number at a time.
    ///
    /// Runs are independent; one clip's polling never stalls another's
    /// submission, and per-run temp filenames never collide.
    pub async fn run_batch(
        &self,
        dir: &Path,
        params: &DubParams,
        max_concurrent: usize,
    ) -> Result<BatchSummary> {
        let mut inputs = Vec::new();

        for entry in fs_err::read_dir(dir)? {
            let path = entry?.path();
            if is_video_file(&path) {
                inputs.push(path);
            }
        }

        if inputs.is_empty() {
            anyhow::bail!("No video files found in {}", dir.display());
        }

        inputs.sort();

        use futures_util::stream::{self, StreamExt};

        let results: Vec<(PathBuf, std::result::Result<PathBuf, PipelineError>)> =
            stream::iter(inputs)
                .map(|input| async move {
                    let result = self.run(&input, params).await;
                    (input, result)
                })
                .buffer_unordered(max_concurrent.max(1))
                .collect()
                .await;

        let mut summary = BatchSummary::default();
        for (input, result) in results {
            match result {
                Ok(output) => summary.succeeded.push(output),
                Err(e) => {
                    tracing::warn!("Failed to dub {}: {}", input.display(), e);
                    summary.failed.push((input, e));
                }
            }
        }

        Ok(summary)
    }

    /// Temp path for the downloaded dubbed artifact; the run id keeps
    /// concurrent runs over the same input from colliding
    fn temp_path(&self, input: &Path) -> PathBuf {
        let run_id = &Uuid::new_v4().to_string()[..8];
        let filename = input
            .file_name()
            .map(|n| sanitize_filename(&n.to_string_lossy()))
            .unwrap_or_else(|| "input.mp4".to_string());

        self.temp_dir.path().join(format!("dubbed-{}-{}", run_id, filename))
    }

    fn output_path(&self, input: &Path) -> PathBuf {
        let filename = input
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "output.mp4".into());

        self.output_dir.join(filename)
    }
}

fn is_video_file(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("mp4") | Some("mov")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobId, JobStatus, StatusSource};
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    mock! {
        Provider {}

        #[async_trait]
        impl StatusSource for Provider {
            async fn fetch_status(&self, id: &JobId) -> crate::Result<Job>;
        }

        #[async_trait]
        impl DubbingProvider for Provider {
            async fn submit(&self, input: &Path, params: &DubParams) -> crate::Result<JobId>;
            async fn fetch(&self, id: &JobId, language: &str, dest: &Path) -> crate::Result<()>;
        }
    }

    mock! {
        Media {}

        #[async_trait]
        impl MediaProcessor for Media {
            async fn validate(&self, path: &Path) -> crate::Result<bool>;
            async fn has_audio_track(&self, path: &Path) -> crate::Result<bool>;
            async fn merge(&self, video: &Path, audio_source: &Path, output: &Path) -> crate::Result<()>;
        }
    }

    fn pipeline(
        provider: MockProvider,
        media: MockMedia,
        waiter: JobWaiter,
        output_dir: PathBuf,
    ) -> DubbingPipeline {
        DubbingPipeline::new(Arc::new(provider), Arc::new(media), waiter, output_dir).unwrap()
    }

    fn fast_waiter(max_attempts: u32) -> JobWaiter {
        JobWaiter::new(max_attempts, Duration::from_secs(10))
    }

    fn running(id: &JobId) -> Job {
        Job {
            id: id.clone(),
            status: JobStatus::Running,
            error_message: None,
        }
    }

    fn succeeded(id: &JobId) -> Job {
        Job {
            id: id.clone(),
            status: JobStatus::Succeeded,
            error_message: None,
        }
    }

    fn temp_file_count(pipeline: &DubbingPipeline) -> usize {
        std::fs::read_dir(pipeline.temp_dir()).unwrap().count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_returns_output_and_removes_dubbed_temp() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();
        let output_dir = work.path().join("output");

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));

        provider
            .expect_submit()
            .times(1)
            .returning(|_, _| Ok(JobId::new("job-123")));

        // dubbing, dubbing, dubbed
        let polls = AtomicU32::new(0);
        provider.expect_fetch_status().times(3).returning(move |id| {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(running(id))
            } else {
                Ok(succeeded(id))
            }
        });

        // Record where the artifact lands so the merge assertion below can
        // check its audio source is the fetched file, and the final
        // assertion can check it was deleted.
        let fetched: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
        let fetched_by_fetch = Arc::clone(&fetched);
        provider
            .expect_fetch()
            .times(1)
            .returning(move |_, language, dest| {
                assert_eq!(language, "hi");
                std::fs::write(dest, b"dubbed audio").unwrap();
                *fetched_by_fetch.lock().unwrap() = Some(dest.to_path_buf());
                Ok(())
            });

        media.expect_has_audio_track().times(1).returning(|_| Ok(true));

        let fetched_by_merge = Arc::clone(&fetched);
        media
            .expect_merge()
            .times(1)
            .returning(move |_, audio_source, output| {
                let expected = fetched_by_merge.lock().unwrap().clone().unwrap();
                assert_eq!(audio_source, expected.as_path());
                std::fs::write(output, b"merged video").unwrap();
                Ok(())
            });

        let pipeline = pipeline(provider, media, fast_waiter(120), output_dir.clone());
        let result = pipeline.run(&input, &DubParams::new("hi")).await.unwrap();

        assert_eq!(result, output_dir.join("clip.mp4"));
        assert!(result.exists());

        let dubbed = fetched.lock().unwrap().clone().unwrap();
        assert!(!dubbed.exists(), "dubbed temp file must be removed");
        assert_eq!(temp_file_count(&pipeline), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_transport_error_skips_polling_and_leaves_no_temp_files() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));
        provider
            .expect_submit()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        provider.expect_fetch_status().times(0);
        provider.expect_fetch().times(0);

        let pipeline = pipeline(provider, media, fast_waiter(120), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        assert!(matches!(err, PipelineError::SubmissionFailed(_)));
        assert_eq!(temp_file_count(&pipeline), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_input_fails_before_submission() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("missing.mp4");

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(false));
        provider.expect_submit().times(0);

        let pipeline = pipeline(provider, media, fast_waiter(120), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_surfaces_message_without_download() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));
        provider
            .expect_submit()
            .returning(|_, _| Ok(JobId::new("job-123")));
        provider.expect_fetch_status().times(1).returning(|id| {
            Ok(Job {
                id: id.clone(),
                status: JobStatus::Failed,
                error_message: Some("bad source audio".to_string()),
            })
        });
        provider.expect_fetch().times(0);

        let pipeline = pipeline(provider, media, fast_waiter(120), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        match err {
            PipelineError::JobFailed(reason) => assert_eq!(reason, "bad source audio"),
            other => panic!("expected JobFailed, got {:?}", other),
        }
        assert_eq!(temp_file_count(&pipeline), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_surfaces_attempt_count() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));
        provider
            .expect_submit()
            .returning(|_, _| Ok(JobId::new("job-123")));
        provider
            .expect_fetch_status()
            .times(3)
            .returning(|id| Ok(running(id)));
        provider.expect_fetch().times(0);

        let pipeline = pipeline(provider, media, fast_waiter(3), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        assert!(matches!(err, PipelineError::JobTimedOut { attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_without_audio_track_is_invalid_and_cleaned_up() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));
        provider
            .expect_submit()
            .returning(|_, _| Ok(JobId::new("job-123")));
        provider
            .expect_fetch_status()
            .returning(|id| Ok(succeeded(id)));
        provider.expect_fetch().times(1).returning(|_, _, dest| {
            std::fs::write(dest, b"video without audio").unwrap();
            Ok(())
        });
        media.expect_has_audio_track().returning(|_| Ok(false));
        media.expect_merge().times(0);

        let pipeline = pipeline(provider, media, fast_waiter(120), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        assert!(matches!(err, PipelineError::DownloadInvalid(_)));
        assert_eq!(temp_file_count(&pipeline), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_failure_still_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("clip.mp4");
        std::fs::write(&input, b"original video").unwrap();

        let mut provider = MockProvider::new();
        let mut media = MockMedia::new();

        media.expect_validate().returning(|_| Ok(true));
        provider
            .expect_submit()
            .returning(|_, _| Ok(JobId::new("job-123")));
        provider
            .expect_fetch_status()
            .returning(|id| Ok(succeeded(id)));
        provider.expect_fetch().returning(|_, _, dest| {
            std::fs::write(dest, b"dubbed audio").unwrap();
            Ok(())
        });
        media.expect_has_audio_track().returning(|_| Ok(true));
        media
            .expect_merge()
            .returning(|_, _, _| Err(anyhow::anyhow!("codec not supported")));

        let pipeline = pipeline(provider, media, fast_waiter(120), work.path().join("output"));
        let err = pipeline.run(&input, &DubParams::new("hi")).await.unwrap_err();

        assert!(matches!(err, PipelineError::MergeFailed(_)));
        assert_eq!(temp_file_count(&pipeline), 0);
    }

    #[tokio::test]
    async fn test_temp_artifacts_cleanup_is_idempotent() {
        let work = tempfile::tempdir().unwrap();
        let file = work.path().join("scratch.mp4");
        std::fs::write(&file, b"scratch").unwrap();

        let mut temp = TempArtifacts::default();
        temp.register(file.clone());
        // A registered path that was never written must not trip cleanup
        temp.register(work.path().join("never-created.mp4"));

        temp.cleanup().await;
        assert!(!file.exists());
        assert!(temp.is_empty());

        // Second cleanup is a no-op
        temp.cleanup().await;
        assert!(temp.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_retries_with_backoff_then_proceeds() {
        let work = tempfile::tempdir().unwrap();
        // A directory defeats remove_file on every attempt
        let stubborn = work.path().join("stubborn");
        std::fs::create_dir(&stubborn).unwrap();

        let mut temp = TempArtifacts::default();
        temp.register(stubborn.clone());

        let start = tokio::time::Instant::now();
        temp.cleanup().await;

        // Three attempts with a fixed backoff between them, no escalation
        assert_eq!(start.elapsed(), CLEANUP_BACKOFF * (CLEANUP_ATTEMPTS - 1));
        assert!(temp.is_empty(), "registry drains even when removal fails");
        assert!(stubborn.exists());

        // A later cleanup does not revisit the abandoned path
        let start = tokio::time::Instant::now();
        temp.cleanup().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_temp_artifacts_drop_removes_remaining_files() {
        let work = tempfile::tempdir().unwrap();
        let file = work.path().join("scratch.mp4");
        std::fs::write(&file, b"scratch").unwrap();

        {
            let mut temp = TempArtifacts::default();
            temp.register(file.clone());
        }

        assert!(!file.exists());
    }

    #[test]
    fn test_is_video_file() {
        let work = tempfile::tempdir().unwrap();
        let mp4 = work.path().join("a.mp4");
        let txt = work.path().join("b.txt");
        std::fs::write(&mp4, b"x").unwrap();
        std::fs::write(&txt, b"x").unwrap();

        assert!(is_video_file(&mp4));
        assert!(!is_video_file(&txt));
        assert!(!is_video_file(work.path()));
    }
}
