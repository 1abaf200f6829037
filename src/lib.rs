//! # vid2tutorial
//!
//! Turn an instructional video into an illustrated, step-by-step tutorial.
//!
//! ## Why this crate?
//!
//! A how-to video is easy to record and tedious to follow: you scrub back
//! and forth to find the moment a step happens. This crate transcribes the
//! video, asks a language model to restructure the transcript into titled
//! steps, and asks a vision model to pick, for every step, the sampled frame
//! that best illustrates it. The result is a Markdown document with one
//! screenshot and one "jump to video" link per step.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Acquire    yt-dlp / direct HTTP download into the job directory
//!  ├─ 2. Transcribe speech-to-text, cached as transcription_result.json
//!  ├─ 3. Sample     one frame every 10 s (ffmpeg, spawn_blocking)
//!  ├─ 4. Structure  transcript → {title, introduction, steps} via LLM
//!  ├─ 5. Match      one vision call per step picks its frame
//!  └─ 6. Document   output/tutorial.md + output/tutorial.json
//! ```
//!
//! Every job reports its progress through a [`StatusRecord`] in a shared
//! [`StatusStore`]. The two LLM stages never fail a job: when a service is
//! unavailable or answers nonsense they fall back to a deterministic
//! outline or frame.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vid2tutorial::{InMemoryStatusStore, JobManager, TutorialConfig, TutorialPipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Speech-to-text from OPENAI_API_KEY; LLM provider auto-detected.
//!     let config = TutorialConfig::default();
//!     let pipeline = TutorialPipeline::from_env(config, Arc::new(InMemoryStatusStore::new()))?;
//!     let manager = JobManager::new(pipeline);
//!
//!     let job = manager.submit("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?;
//!     loop {
//!         let status = manager.status(&job)?;
//!         eprintln!("{} ({}%)", status.stage, status.progress);
//!         if status.stage.is_terminal() {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(2)).await;
//!     }
//!     let tutorial = manager.tutorial(&job).await?;
//!     println!("{}", tutorial.document_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `vid2tut` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! vid2tutorial = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! The default adapters shell out to `yt-dlp` (download), `ffmpeg` (audio
//! extraction, frame decoding) and `ffprobe` (duration). All three must be
//! on `PATH`, or be replaced through the collaborator traits in
//! [`services`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod manager;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod services;
pub mod status;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{TutorialConfig, TutorialConfigBuilder};
pub use convert::TutorialPipeline;
pub use error::{ServiceError, TutorialError};
pub use job::{JobId, JobWorkspace};
pub use manager::JobManager;
pub use output::{
    FrameRecord, MatchedStep, Outline, OutlineStep, Transcript, TranscriptSegment, Tutorial, VideoSource,
};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use services::{
    OfflineScorer, OfflineStructurer, Scorer, SpeechToText, Structurer, VideoDecoder, VideoFetcher, VideoInfo,
};
pub use status::{InMemoryStatusStore, JobProgress, Stage, StatusRecord, StatusStore};
