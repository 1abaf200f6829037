//! Error types for the vid2tutorial library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`TutorialError`] is **fatal**: the job cannot proceed at all (video
//!   unreachable, source unreadable, transcription failed, disk full). The
//!   pipeline moves the job to the `error` stage with the display string of
//!   this error as its diagnostic message.
//!
//! * [`ServiceError`] is **recoverable**: the text-generation or
//!   vision-scoring service failed or answered with something unusable. The
//!   structuring and matching stages absorb these with a deterministic
//!   fallback and only log them.

use std::path::PathBuf;
use thiserror::Error;

use crate::status::Stage;

/// All fatal errors returned by the vid2tutorial library.
///
/// Service-level failures use [`ServiceError`] and never reach this type.
#[derive(Debug, Error)]
pub enum TutorialError {
    // ── Acquisition errors ────────────────────────────────────────────────
    /// The URL is empty or not an HTTP/HTTPS URL.
    #[error("Invalid video URL '{url}': not a valid HTTP/HTTPS URL")]
    InvalidUrl { url: String },

    /// The video metadata could not be resolved.
    #[error("Failed to resolve video '{url}': {reason}")]
    ResolveFailed { url: String, reason: String },

    /// The media download failed.
    #[error("Error downloading video '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// An external tool (yt-dlp, ffmpeg, ffprobe) could not be executed.
    #[error("Failed to run '{tool}': {reason}\nCheck that it is installed and on PATH.")]
    ToolUnavailable { tool: String, reason: String },

    // ── Media errors ──────────────────────────────────────────────────────
    /// The downloaded media could not be opened for decoding at all.
    #[error("Cannot open video source '{path}': {detail}")]
    SourceUnreadable { path: PathBuf, detail: String },

    /// Sampling finished without decoding a single frame.
    #[error("No frames could be extracted from '{path}' (duration {duration:.2}s)")]
    NoFramesExtracted { path: PathBuf, duration: f64 },

    /// A decoded frame could not be encoded or written.
    #[error("Failed to persist frame at {timestamp:.2}s: {detail}")]
    FrameWriteFailed { timestamp: f64, detail: String },

    // ── Transcription errors ──────────────────────────────────────────────
    /// The speech-to-text engine failed.
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// The cached transcript exists but cannot be parsed.
    #[error("Transcript cache '{path}' is corrupt: {detail}")]
    CorruptTranscriptCache { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// No job with this id is tracked by the status store.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job id is already tracked; a re-run needs a new job id.
    #[error("Job {0} already exists")]
    JobAlreadyExists(String),

    /// The job has not reached the `completed` stage.
    #[error("Tutorial for job {job} is not ready yet (stage: {stage})")]
    NotReady { job: String, stage: Stage },

    /// A frame name was requested that is not a plain file in the frames dir.
    #[error("Frame '{name}' not found for job {job}")]
    FrameNotFound { job: String, name: String },

    /// The status machine rejected a transition.
    #[error("Invalid stage transition {from} → {to}")]
    InvalidTransition { from: Stage, to: Stage },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a directory or write an artifact.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TutorialError {
    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TutorialError::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// A recoverable failure of an external text or vision service.
///
/// Callers of [`crate::services::Structurer`] and [`crate::services::Scorer`]
/// turn these into a fallback outline or a fallback frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service is deliberately not available (offline stub).
    #[error("{service} service unavailable")]
    Unavailable { service: &'static str },

    /// The request itself failed (network, HTTP status, provider error).
    #[error("{service} request failed: {detail}")]
    RequestFailed {
        service: &'static str,
        detail: String,
    },

    /// The service answered with an empty body.
    #[error("{service} returned an empty response")]
    EmptyResponse { service: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_failed_display() {
        let e = TutorialError::DownloadFailed {
            url: "https://example.com/v".into(),
            reason: "HTTP 404".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with("Error downloading video"), "got: {msg}");
        assert!(msg.contains("HTTP 404"));
    }

    #[test]
    fn not_ready_display_names_stage() {
        let e = TutorialError::NotReady {
            job: "abc".into(),
            stage: Stage::Transcribing,
        };
        assert!(e.to_string().contains("transcribing"));
    }

    #[test]
    fn invalid_transition_display() {
        let e = TutorialError::InvalidTransition {
            from: Stage::MatchingFrames,
            to: Stage::Downloading,
        };
        let msg = e.to_string();
        assert!(msg.contains("matching_frames"));
        assert!(msg.contains("downloading"));
    }

    #[test]
    fn service_error_display() {
        let e = ServiceError::RequestFailed {
            service: "vision",
            detail: "429".into(),
        };
        assert_eq!(e.to_string(), "vision request failed: 429");
        assert_eq!(
            ServiceError::Unavailable { service: "text" }.to_string(),
            "text service unavailable"
        );
    }
}
