//! The job pipeline: one video URL in, one tutorial out.
//!
//! [`TutorialPipeline`] owns the collaborators and drives a job through its
//! stages in order, reporting every transition through [`JobProgress`]:
//!
//! ```text
//! queued → downloading → loading_model → transcribing → extracting_frames
//!        → structuring_tutorial → matching_frames → completed
//! ```
//!
//! A fatal error at any point moves the job to `error` with the error's
//! display string and stops the run; the job directory is left in place.
//! Service failures during structuring and matching are not fatal, see
//! [`crate::pipeline::structure`] and [`crate::pipeline::matcher`].

use crate::config::TutorialConfig;
use crate::error::TutorialError;
use crate::job::{JobId, JobWorkspace};
use crate::output::Tutorial;
use crate::pipeline::acquire::{self, YtDlpFetcher};
use crate::pipeline::llm::{self, LlmScorer, LlmStructurer};
use crate::pipeline::sample::{self, FfmpegDecoder};
use crate::pipeline::transcribe::{TranscriptStore, WhisperApiTranscriber};
use crate::pipeline::{document, matcher, structure};
use crate::services::{
    OfflineScorer, OfflineStructurer, Scorer, SpeechToText, Structurer, VideoDecoder, VideoFetcher,
};
use crate::status::{JobProgress, Stage, StatusRecord, StatusStore};
use edgequake_llm::LLMProvider;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Runs tutorial jobs against a shared status store.
///
/// Cheap to clone; clones share the store and collaborators.
///
/// # Example
/// ```rust,no_run
/// use vid2tutorial::{InMemoryStatusStore, JobId, TutorialConfig, TutorialPipeline};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TutorialConfig::default();
/// let pipeline = TutorialPipeline::from_env(config, Arc::new(InMemoryStatusStore::new()))?;
/// let tutorial = pipeline
///     .run(&JobId::new(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ")
///     .await?;
/// println!("{}", tutorial.document_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TutorialPipeline {
    config: TutorialConfig,
    status: Arc<dyn StatusStore>,
    fetcher: Arc<dyn VideoFetcher>,
    transcripts: TranscriptStore,
    decoder: Arc<dyn VideoDecoder>,
    structurer: Arc<dyn Structurer>,
    scorer: Arc<dyn Scorer>,
}

impl TutorialPipeline {
    /// A pipeline transcribing with `transcriber`, downloading with yt-dlp,
    /// decoding with ffmpeg and with both LLM services offline.
    ///
    /// Swap collaborators with the `with_*` methods.
    pub fn new(
        config: TutorialConfig,
        status: Arc<dyn StatusStore>,
        transcriber: Arc<dyn SpeechToText>,
    ) -> Self {
        Self {
            config,
            status,
            fetcher: Arc::new(YtDlpFetcher::new()),
            transcripts: TranscriptStore::new(transcriber),
            decoder: Arc::new(FfmpegDecoder::new()),
            structurer: Arc::new(OfflineStructurer),
            scorer: Arc::new(OfflineScorer),
        }
    }

    /// A fully networked pipeline configured from the environment.
    ///
    /// Speech-to-text uses [`WhisperApiTranscriber::from_env`]; both LLM
    /// services use the provider resolved by [`llm::resolve_provider`].
    pub fn from_env(config: TutorialConfig, status: Arc<dyn StatusStore>) -> Result<Self, TutorialError> {
        let transcriber = WhisperApiTranscriber::from_env(config.download_timeout_secs)?;
        let provider = llm::resolve_provider(&config)?;
        Ok(Self::new(config, status, Arc::new(transcriber)).with_provider(provider))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn VideoFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn SpeechToText>) -> Self {
        self.transcripts = TranscriptStore::new(transcriber);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn VideoDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_structurer(mut self, structurer: Arc<dyn Structurer>) -> Self {
        self.structurer = structurer;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Use `provider` for both structuring and frame scoring.
    pub fn with_provider(self, provider: Arc<dyn LLMProvider>) -> Self {
        let structurer = Arc::new(LlmStructurer::new(Arc::clone(&provider), &self.config));
        let scorer = Arc::new(LlmScorer::new(provider, &self.config));
        self.with_structurer(structurer).with_scorer(scorer)
    }

    pub fn config(&self) -> &TutorialConfig {
        &self.config
    }

    pub fn status_store(&self) -> &Arc<dyn StatusStore> {
        &self.status
    }

    /// The working directory `job` runs in.
    pub fn workspace(&self, job: &JobId) -> JobWorkspace {
        JobWorkspace::new(&self.config.jobs_root, job)
    }

    /// Start tracking `job` as `queued`.
    ///
    /// # Errors
    /// [`TutorialError::JobAlreadyExists`] if the store already tracks it.
    pub fn register(&self, job: &JobId) -> Result<(), TutorialError> {
        if !self.status.insert(job, StatusRecord::queued()) {
            return Err(TutorialError::JobAlreadyExists(job.to_string()));
        }
        Ok(())
    }

    /// Register `job` and run it to completion.
    ///
    /// The outcome is also visible through the status store: `completed`
    /// on success, `error` with this error's display string on failure.
    pub async fn run(&self, job: &JobId, url: &str) -> Result<Tutorial, TutorialError> {
        self.register(job)?;
        self.execute(job, url).await
    }

    /// Synchronous wrapper around [`TutorialPipeline::run`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn run_sync(&self, job: &JobId, url: &str) -> Result<Tutorial, TutorialError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| TutorialError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.run(job, url))
    }

    /// Run an already registered job.
    pub(crate) async fn execute(&self, job: &JobId, url: &str) -> Result<Tutorial, TutorialError> {
        let progress = JobProgress::new(
            job.clone(),
            Arc::clone(&self.status),
            self.config.progress_callback.clone(),
        );

        let outcome = AssertUnwindSafe(self.run_stages(&progress, url))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TutorialError::Internal(panic_message(payload.as_ref()))));

        match outcome {
            Ok(tutorial) => Ok(tutorial),
            Err(e) => {
                progress.fail(&e.to_string());
                Err(e)
            }
        }
    }

    async fn run_stages(&self, progress: &JobProgress, url: &str) -> Result<Tutorial, TutorialError> {
        let start = Instant::now();
        let job = progress.job();
        let workspace = self.workspace(job);
        workspace.create().await?;
        info!("Job {}: starting for {} in {}", job, url, workspace.root().display());

        // ── Step 1: Acquire ──────────────────────────────────────────────
        progress.advance(Stage::Downloading, None)?;
        let video = acquire::acquire(self.fetcher.as_ref(), &workspace, url).await?;

        // ── Step 2: Transcribe (cached) ──────────────────────────────────
        progress.advance(Stage::LoadingModel, None)?;
        if !self.transcripts.is_cached(&workspace) {
            self.transcripts.prepare().await?;
        }
        progress.advance(Stage::Transcribing, None)?;
        let transcript = self.transcripts.get_or_build(&workspace, &video).await?;

        // ── Step 3: Sample frames ────────────────────────────────────────
        progress.advance(Stage::ExtractingFrames, None)?;
        let callback = self.config.progress_callback.clone();
        let job_id = job.clone();
        let frames = sample::sample_frames(
            Arc::clone(&self.decoder),
            &video.path,
            &workspace,
            self.config.frame_interval_secs,
            self.config.jpeg_quality,
            move |t, total| {
                if let Some(ref cb) = callback {
                    cb.on_frame_sampled(&job_id, t, total);
                }
            },
        )
        .await?;

        // ── Step 4: Structure ────────────────────────────────────────────
        progress.advance(Stage::StructuringTutorial, None)?;
        let outline = structure::structure(self.structurer.as_ref(), &transcript.full_text(), &self.config).await;

        // ── Step 5: Match frames ─────────────────────────────────────────
        progress.advance(Stage::MatchingFrames, None)?;
        let callback = self.config.progress_callback.as_ref();
        let steps = matcher::match_frames(
            self.scorer.as_ref(),
            &outline,
            &frames,
            &transcript.segments,
            &self.config,
            |step_number, total, t| {
                if let Some(cb) = callback {
                    cb.on_step_matched(job, step_number, total, t);
                }
            },
        )
        .await?;

        // ── Step 6: Write document ───────────────────────────────────────
        let tutorial = Tutorial {
            job_id: job.clone(),
            title: outline.title,
            introduction: outline.introduction,
            source_url: video.url,
            video_title: video.title,
            steps,
            document_path: workspace.document_path(),
        };
        document::write_document(&workspace, &tutorial).await?;

        progress.advance(Stage::Completed, None)?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_job_complete(job, tutorial.steps.len());
        }
        info!(
            "Job {}: completed with {} steps in {}ms",
            job,
            tutorial.steps.len(),
            start.elapsed().as_millis()
        );

        Ok(tutorial)
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("pipeline panicked: {}", detail)
}
