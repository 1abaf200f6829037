//! Transcript caching and the Whisper-API speech-to-text adapter.
//!
//! Transcription is the slowest and most expensive stage, so its result is
//! cached as `transcription_result.json` in the job directory. A job
//! resumed in the same directory never calls the engine again. A cache
//! file that exists but does not parse is reported, not overwritten: it may
//! hold the only copy of a paid-for transcript.

use crate::error::TutorialError;
use crate::job::{write_atomic, JobWorkspace};
use crate::output::{Transcript, TranscriptSegment, VideoSource};
use crate::services::SpeechToText;
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Read-through cache in front of a [`SpeechToText`] engine.
#[derive(Clone)]
pub struct TranscriptStore {
    engine: Arc<dyn SpeechToText>,
}

impl TranscriptStore {
    pub fn new(engine: Arc<dyn SpeechToText>) -> Self {
        Self { engine }
    }

    /// Whether the job already has a transcript on disk.
    pub fn is_cached(&self, workspace: &JobWorkspace) -> bool {
        workspace.transcript_path().is_file()
    }

    /// Ready the engine. Only needed before a cache miss.
    pub async fn prepare(&self) -> Result<(), TutorialError> {
        info!("Preparing speech-to-text engine: {}", self.engine.name());
        self.engine.prepare().await
    }

    /// Return the cached transcript, or transcribe once and cache it.
    pub async fn get_or_build(
        &self,
        workspace: &JobWorkspace,
        video: &VideoSource,
    ) -> Result<Transcript, TutorialError> {
        let path = workspace.transcript_path();
        if let Some(transcript) = load(&path).await? {
            info!(
                "Using cached transcript ({} segments) from {}",
                transcript.segments.len(),
                path.display()
            );
            return Ok(transcript);
        }

        info!("Transcribing {} with {}", video.path.display(), self.engine.name());
        let transcript = self.engine.transcribe(&video.path, workspace.root()).await?;

        let json = serde_json::to_vec_pretty(&transcript)
            .map_err(|e| TutorialError::Internal(format!("transcript serialisation: {e}")))?;
        write_atomic(&path, json).await?;
        info!("Transcribed {} segments", transcript.segments.len());

        Ok(transcript)
    }
}

/// Read a transcript cache file. `Ok(None)` when there is none.
pub async fn load(path: &Path) -> Result<Option<Transcript>, TutorialError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TutorialError::CorruptTranscriptCache {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| TutorialError::CorruptTranscriptCache {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
}

const DEFAULT_STT_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_STT_MODEL: &str = "whisper-1";
const AUDIO_FILE: &str = "audio.mp3";

/// Extracted audio inside the scratch directory (the job root).
fn audio_path(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(AUDIO_FILE)
}

/// [`SpeechToText`] over an OpenAI-compatible `/audio/transcriptions`
/// endpoint.
///
/// The audio track is first extracted with `ffmpeg` as mono 16 kHz MP3,
/// which keeps an hour of speech well under the usual 25 MB upload limit.
pub struct WhisperApiTranscriber {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    ffmpeg: PathBuf,
}

impl WhisperApiTranscriber {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, TutorialError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TutorialError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            ffmpeg: PathBuf::from("ffmpeg"),
        })
    }

    /// Configure from `OPENAI_API_KEY`, `VID2TUT_STT_URL` and
    /// `VID2TUT_STT_MODEL`.
    pub fn from_env(timeout_secs: u64) -> Result<Self, TutorialError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TutorialError::ProviderNotConfigured {
                provider: "whisper".to_string(),
                hint: "Set OPENAI_API_KEY (and optionally VID2TUT_STT_URL for a compatible server)."
                    .to_string(),
            })?;
        let endpoint = env_or("VID2TUT_STT_URL", DEFAULT_STT_URL);
        let model = env_or("VID2TUT_STT_MODEL", DEFAULT_STT_MODEL);

        Self::new(api_key, endpoint, model, timeout_secs)
    }

    /// Use an explicit `ffmpeg` binary instead of looking it up on `PATH`.
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    async fn extract_audio(&self, media: &Path, dest: &Path) -> Result<(), TutorialError> {
        let output = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-y")
            .arg("-i")
            .arg(media)
            .arg("-vn")
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg("-b:a")
            .arg("32k")
            .arg(dest)
            .output()
            .await
            .map_err(|e| TutorialError::ToolUnavailable {
                tool: self.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(TutorialError::TranscriptionFailed(format!(
                "audio extraction failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechToText for WhisperApiTranscriber {
    async fn prepare(&self) -> Result<(), TutorialError> {
        let status = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .await
            .map_err(|e| TutorialError::ToolUnavailable {
                tool: self.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?
            .status;
        if !status.success() {
            return Err(TutorialError::ToolUnavailable {
                tool: self.ffmpeg.display().to_string(),
                reason: format!("exited with {status}"),
            });
        }
        Ok(())
    }

    async fn transcribe(&self, media: &Path, scratch_dir: &Path) -> Result<Transcript, TutorialError> {
        let audio = audio_path(scratch_dir);
        self.extract_audio(media, &audio).await?;

        let bytes = tokio::fs::read(&audio)
            .await
            .map_err(|e| TutorialError::TranscriptionFailed(format!("{}: {}", audio.display(), e)))?;
        debug!("Uploading {} bytes of audio to {}", bytes.len(), self.endpoint);

        let file_part = multipart::Part::bytes(bytes)
            .file_name(AUDIO_FILE)
            .mime_str("audio/mpeg")
            .map_err(|e| TutorialError::TranscriptionFailed(e.to_string()))?;

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .part("file", file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TutorialError::TranscriptionFailed(format!("request to {} timed out", self.endpoint))
                } else {
                    TutorialError::TranscriptionFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TutorialError::TranscriptionFailed(format!("HTTP {}: {}", status, body)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TutorialError::TranscriptionFailed(e.to_string()))?;
        parse_verbose_json(&body)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct VerboseJson {
    #[serde(default)]
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

/// Map a `verbose_json` transcription body onto a [`Transcript`].
fn parse_verbose_json(body: &str) -> Result<Transcript, TutorialError> {
    let raw: VerboseJson = serde_json::from_str(body)
        .map_err(|e| TutorialError::TranscriptionFailed(format!("unexpected response: {e}")))?;

    let mut segments: Vec<TranscriptSegment> = raw
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: s.text,
        })
        .collect();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    Ok(Transcript {
        text: raw.text.trim().to_string(),
        segments,
        language: raw.language,
    })
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechToText for CountingEngine {
        async fn transcribe(&self, _media: &Path, _scratch: &Path) -> Result<Transcript, TutorialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Transcript::from_segments(vec![
                TranscriptSegment {
                    start: 0.0,
                    end: 4.0,
                    text: "Welcome back.".into(),
                },
                TranscriptSegment {
                    start: 4.0,
                    end: 9.5,
                    text: "Today: sourdough.".into(),
                },
            ]))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    async fn fixture() -> (tempfile::TempDir, JobWorkspace, VideoSource) {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::new(tmp.path(), &JobId::new());
        ws.create().await.unwrap();
        let video = VideoSource {
            path: ws.video_path("mp4"),
            title: "Bread".into(),
            url: "https://example.com/bread".into(),
        };
        (tmp, ws, video)
    }

    #[tokio::test]
    async fn get_or_build_transcribes_once() {
        let (_tmp, ws, video) = fixture().await;
        let engine = Arc::new(CountingEngine {
            calls: AtomicUsize::new(0),
        });
        let store = TranscriptStore::new(engine.clone());

        assert!(!store.is_cached(&ws));
        let first = store.get_or_build(&ws, &video).await.unwrap();
        assert!(store.is_cached(&ws));
        let second = store.get_or_build(&ws, &video).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.full_text(), "Welcome back. Today: sourdough.");
    }

    #[tokio::test]
    async fn corrupt_cache_is_fatal() {
        let (_tmp, ws, video) = fixture().await;
        std::fs::write(ws.transcript_path(), b"{\"segments\": [").unwrap();
        let engine = Arc::new(CountingEngine {
            calls: AtomicUsize::new(0),
        });
        let store = TranscriptStore::new(engine.clone());

        let err = store.get_or_build(&ws, &video).await.unwrap_err();
        assert!(matches!(err, TutorialError::CorruptTranscriptCache { .. }));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn load_missing_cache_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load(&tmp.path().join("nope.json")).await.unwrap().is_none());
    }

    #[test]
    fn audio_lands_in_the_job_root() {
        let ws = JobWorkspace::new(Path::new("/jobs"), &JobId::new());
        let audio = audio_path(ws.root());
        assert_eq!(audio.parent(), Some(ws.root()));
        assert_eq!(audio.file_name().and_then(|n| n.to_str()), Some("audio.mp3"));
    }

    #[test]
    fn verbose_json_is_mapped_and_sorted() {
        let body = r#"{
            "task": "transcribe",
            "language": "english",
            "duration": 12.0,
            "text": " Second. First. ",
            "segments": [
                {"id": 1, "start": 6.0, "end": 12.0, "text": " First.", "tokens": [1]},
                {"id": 0, "start": 0.0, "end": 6.0, "text": " Second."}
            ]
        }"#;
        let t = parse_verbose_json(body).unwrap();
        assert_eq!(t.language.as_deref(), Some("english"));
        assert_eq!(t.text, "Second. First.");
        assert_eq!(t.segments[0].start, 0.0);
        assert_eq!(t.segments[1].text, " First.");
    }

    #[test]
    fn plain_text_body_is_rejected() {
        let err = parse_verbose_json("hello world").unwrap_err();
        assert!(matches!(err, TutorialError::TranscriptionFailed(_)));
    }
}
