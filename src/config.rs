//! Configuration types for video-to-tutorial conversion.
//!
//! All pipeline behaviour is controlled through [`TutorialConfig`], built via
//! its [`TutorialConfigBuilder`]. The collaborators themselves (downloader,
//! speech-to-text engine, LLM services) are injected on
//! [`crate::convert::TutorialPipeline`]; this struct only carries the knobs
//! they and the stages read.

use crate::error::TutorialError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a tutorial conversion.
///
/// Built via [`TutorialConfig::builder()`] or using
/// [`TutorialConfig::default()`].
///
/// # Example
/// ```rust
/// use vid2tutorial::TutorialConfig;
///
/// let config = TutorialConfig::builder()
///     .frame_interval_secs(5.0)
///     .max_candidates(6)
///     .jobs_root("/var/lib/vid2tut/jobs")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TutorialConfig {
    /// Seconds between sampled frames. Default: 10.0.
    ///
    /// Smaller intervals give the matcher more candidates per step at the
    /// cost of one decode + one JPEG per extra tick.
    pub frame_interval_secs: f64,

    /// Maximum frames shown to the vision service per step. Default: 8.
    pub max_candidates: usize,

    /// Directory under which each job gets its own working directory.
    /// Default: `jobs`.
    pub jobs_root: PathBuf,

    /// Number of steps scored concurrently. Default: 4.
    ///
    /// Results are re-assembled in step order regardless of completion
    /// order. Set to 1 for strictly sequential scoring.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4o-mini".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature when structuring the transcript. Default: 0.7.
    pub structuring_temperature: f32,

    /// Output budget for the structured outline. Default: 4096.
    pub structuring_max_tokens: usize,

    /// Sampling temperature when choosing a frame. Default: 0.3.
    pub scoring_temperature: f32,

    /// Output budget for the frame choice; the answer is a single number.
    /// Default: 10.
    pub scoring_max_tokens: usize,

    /// Characters of transcript used as the fallback introduction. Default: 500.
    pub intro_fallback_chars: usize,

    /// JPEG quality for persisted and transmitted frames (1–100). Default: 85.
    pub jpeg_quality: u8,

    /// Timeout for direct HTTP downloads and speech-to-text uploads in
    /// seconds. Default: 600.
    pub download_timeout_secs: u64,

    /// Custom system prompt for the structuring call. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TutorialConfig {
    fn default() -> Self {
        Self {
            frame_interval_secs: 10.0,
            max_candidates: 8,
            jobs_root: PathBuf::from("jobs"),
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            structuring_temperature: 0.7,
            structuring_max_tokens: 4096,
            scoring_temperature: 0.3,
            scoring_max_tokens: 10,
            intro_fallback_chars: 500,
            jpeg_quality: 85,
            download_timeout_secs: 600,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TutorialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TutorialConfig")
            .field("frame_interval_secs", &self.frame_interval_secs)
            .field("max_candidates", &self.max_candidates)
            .field("jobs_root", &self.jobs_root)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("structuring_temperature", &self.structuring_temperature)
            .field("scoring_temperature", &self.scoring_temperature)
            .field("intro_fallback_chars", &self.intro_fallback_chars)
            .field("jpeg_quality", &self.jpeg_quality)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl TutorialConfig {
    /// Create a new builder for `TutorialConfig`.
    pub fn builder() -> TutorialConfigBuilder {
        TutorialConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`TutorialConfig`].
#[derive(Debug)]
pub struct TutorialConfigBuilder {
    config: TutorialConfig,
}

impl TutorialConfigBuilder {
    pub fn frame_interval_secs(mut self, secs: f64) -> Self {
        self.config.frame_interval_secs = secs;
        self
    }

    pub fn max_candidates(mut self, n: usize) -> Self {
        self.config.max_candidates = n;
        self
    }

    pub fn jobs_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.jobs_root = dir.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn structuring_temperature(mut self, t: f32) -> Self {
        self.config.structuring_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn structuring_max_tokens(mut self, n: usize) -> Self {
        self.config.structuring_max_tokens = n;
        self
    }

    pub fn scoring_temperature(mut self, t: f32) -> Self {
        self.config.scoring_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn scoring_max_tokens(mut self, n: usize) -> Self {
        self.config.scoring_max_tokens = n;
        self
    }

    pub fn intro_fallback_chars(mut self, n: usize) -> Self {
        self.config.intro_fallback_chars = n;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TutorialConfig, TutorialError> {
        let c = &self.config;
        if !c.frame_interval_secs.is_finite() || c.frame_interval_secs <= 0.0 {
            return Err(TutorialError::InvalidConfig(format!(
                "Frame interval must be a positive number of seconds, got {}",
                c.frame_interval_secs
            )));
        }
        if c.max_candidates == 0 {
            return Err(TutorialError::InvalidConfig(
                "Max candidates must be ≥ 1".into(),
            ));
        }
        if c.scoring_max_tokens == 0 || c.structuring_max_tokens == 0 {
            return Err(TutorialError::InvalidConfig(
                "Max tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
