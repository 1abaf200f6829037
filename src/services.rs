//! Collaborator traits consumed by the pipeline.
//!
//! Each external dependency of a job sits behind one trait so the stages can
//! be driven by real adapters in production and by test doubles in tests:
//!
//! | Trait | Stage | Production adapter |
//! |-------|-------|--------------------|
//! | [`VideoFetcher`] | downloading | [`crate::pipeline::acquire::YtDlpFetcher`], [`crate::pipeline::acquire::HttpFetcher`] |
//! | [`SpeechToText`] | loading_model, transcribing | [`crate::pipeline::transcribe::WhisperApiTranscriber`] |
//! | [`VideoDecoder`] | extracting_frames | [`crate::pipeline::sample::FfmpegDecoder`] |
//! | [`Structurer`] | structuring_tutorial | [`crate::pipeline::llm::LlmStructurer`] |
//! | [`Scorer`] | matching_frames | [`crate::pipeline::llm::LlmScorer`] |
//!
//! [`Structurer`] and [`Scorer`] report failures as [`ServiceError`], which
//! the stages turn into deterministic fallbacks. [`OfflineStructurer`] and
//! [`OfflineScorer`] always report the service as unavailable, so a job run
//! with them exercises exactly the fallback path.

use crate::error::{ServiceError, TutorialError};
use crate::output::Transcript;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::Path;

/// Metadata of a remote video, known before downloading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub title: String,
    /// Container extension without the dot, e.g. `mp4`.
    pub file_extension: String,
}

/// Video acquisition service.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Look up title and container format without downloading.
    async fn resolve(&self, url: &str) -> Result<VideoInfo, TutorialError>;

    /// Download the media to `dest`.
    ///
    /// The acquisition stage never calls this when `dest` already exists.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), TutorialError>;
}

/// Speech-to-text engine.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Make the engine ready (load a model, check credentials).
    async fn prepare(&self) -> Result<(), TutorialError> {
        Ok(())
    }

    /// Transcribe the audio track of the media at `media`.
    ///
    /// `scratch_dir` is the job's private directory, usable for
    /// intermediate files.
    async fn transcribe(&self, media: &Path, scratch_dir: &Path) -> Result<Transcript, TutorialError>;

    /// Engine name for logs.
    fn name(&self) -> &str;
}

/// Blocking frame decoder for a media file on disk.
///
/// Called from the blocking thread pool; implementations may block freely.
pub trait VideoDecoder: Send + Sync {
    /// Duration of the media in seconds. An error here means the source
    /// cannot be opened at all.
    fn probe_duration(&self, path: &Path) -> Result<f64, TutorialError>;

    /// Decode the frame nearest to `timestamp` seconds.
    fn decode_at(&self, path: &Path, timestamp: f64) -> Result<DynamicImage, TutorialError>;
}

/// Text-generation service used to structure a transcript.
#[async_trait]
pub trait Structurer: Send + Sync {
    /// Send `prompt` (with the structuring system prompt) and return the raw
    /// reply, expected to be a JSON object.
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Vision-capable service used to pick a frame for a step.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Present `step_description` and the base64 JPEG `images` (in order,
    /// referred to as Frame 1..n) and return the raw reply, expected to
    /// contain the chosen ordinal.
    async fn score(&self, step_description: &str, images: &[&str]) -> Result<String, ServiceError>;
}

/// Deterministic [`Structurer`] that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStructurer;

#[async_trait]
impl Structurer for OfflineStructurer {
    async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable { service: "text" })
    }
}

/// Deterministic [`Scorer`] that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineScorer;

#[async_trait]
impl Scorer for OfflineScorer {
    async fn score(&self, _step_description: &str, _images: &[&str]) -> Result<String, ServiceError> {
        Err(ServiceError::Unavailable { service: "vision" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_services_are_unavailable() {
        let err = OfflineStructurer.complete("anything").await.unwrap_err();
        assert_eq!(err, ServiceError::Unavailable { service: "text" });

        let err = OfflineScorer.score("step", &["a", "b"]).await.unwrap_err();
        assert_eq!(err, ServiceError::Unavailable { service: "vision" });
    }
}
