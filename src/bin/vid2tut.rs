//! CLI binary for vid2tutorial.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `TutorialConfig`, runs one job in the foreground and prints where the
//! tutorial was written.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vid2tutorial::pipeline::acquire::{HttpFetcher, YtDlpFetcher};
use vid2tutorial::pipeline::document::format_timestamp;
use vid2tutorial::pipeline::transcribe::WhisperApiTranscriber;
use vid2tutorial::{
    InMemoryStatusStore, JobId, OfflineScorer, OfflineStructurer, PipelineProgressCallback,
    ProgressCallback, Stage, StatusRecord, TutorialConfig, TutorialPipeline,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Terminal progress callback: one bar tracking the job's 0–100 progress,
/// with a log line per stage and per matched step. Steps may be matched
/// out of order when scoring runs concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    frames: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("queued");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            frames: AtomicUsize::new(0),
        })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage(&self, _job: &JobId, record: &StatusRecord) {
        if record.stage == Stage::Completed {
            return;
        }
        self.bar.set_prefix(record.stage.as_str().to_string());
        self.bar.set_position(record.progress as u64);
        self.bar.set_message(String::new());
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(record.stage.as_str())));
    }

    fn on_frame_sampled(&self, _job: &JobId, timestamp: f64, total_ticks: usize) {
        let n = self.frames.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_message(format!(
            "frame {}/{} at {}",
            n,
            total_ticks,
            format_timestamp(timestamp)
        ));
    }

    fn on_step_matched(&self, _job: &JobId, step_number: usize, total_steps: usize, timestamp: f64) {
        self.bar.println(format!(
            "  {} Step {:>2}/{:<2}  {}",
            green("✓"),
            step_number,
            total_steps,
            dim(&format!("frame at {}", format_timestamp(timestamp))),
        ));
    }

    fn on_job_complete(&self, _job: &JobId, total_steps: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Tutorial with {} steps generated",
            green("✔"),
            bold(&total_steps.to_string())
        );
    }

    fn on_job_error(&self, _job: &JobId, error: &str) {
        self.bar.finish_and_clear();

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 120 {
            format!("{}\u{2026}", error.chars().take(119).collect::<String>())
        } else {
            error.to_string()
        };
        eprintln!("{} {}", red("✘"), red(&msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic run (writes jobs/<uuid>/output/tutorial.md)
  vid2tut https://www.youtube.com/watch?v=VIDEO_ID

  # Denser sampling, more candidates per step
  vid2tut --interval 5 --max-candidates 8 https://youtu.be/VIDEO_ID

  # Direct link to a media file (no yt-dlp)
  vid2tut --direct https://example.com/media/howto.mp4

  # Re-run a previous job, reusing its download and transcript
  vid2tut --job-id 3f2a... https://youtu.be/VIDEO_ID

  # Skip the LLM services entirely (fallback outline and frames)
  vid2tut --offline https://youtu.be/VIDEO_ID

  # JSON output
  vid2tut --json https://youtu.be/VIDEO_ID > tutorial.json

REQUIRED TOOLS:
  yt-dlp    video download (not needed with --direct)
  ffmpeg    audio extraction and frame decoding
  ffprobe   video duration

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (speech-to-text and default LLM)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  VID2TUT_STT_URL         OpenAI-compatible /audio/transcriptions endpoint
  VID2TUT_STT_MODEL       Speech-to-text model (default: whisper-1)
"#;

/// Turn a video into an illustrated step-by-step tutorial.
#[derive(Parser, Debug)]
#[command(
    name = "vid2tut",
    version,
    about = "Turn a video into an illustrated step-by-step tutorial",
    long_about = "Download a video, transcribe it, structure the transcript into tutorial steps \
with an LLM and pick an illustrative frame for every step with a vision model. Supports \
OpenAI, Anthropic, Google Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Video page URL (anything yt-dlp supports) or direct media URL.
    url: String,

    /// Directory holding one working directory per job.
    #[arg(long, env = "VID2TUT_JOBS_DIR", default_value = "jobs")]
    jobs_dir: PathBuf,

    /// Run in an existing job directory, reusing its download and transcript.
    #[arg(long, env = "VID2TUT_JOB_ID")]
    job_id: Option<String>,

    /// Seconds between sampled frames.
    #[arg(long, env = "VID2TUT_INTERVAL", default_value_t = 10.0)]
    interval: f64,

    /// Maximum frames shown to the vision model per step.
    #[arg(long, env = "VID2TUT_MAX_CANDIDATES", default_value_t = 8)]
    max_candidates: usize,

    /// Number of steps scored concurrently.
    #[arg(short, long, env = "VID2TUT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// LLM model ID (e.g. gpt-4o-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom structuring system prompt.
    #[arg(long, env = "VID2TUT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Download the URL directly over HTTP instead of through yt-dlp.
    #[arg(long, env = "VID2TUT_DIRECT")]
    direct: bool,

    /// Do not call the LLM services; use the fallback outline and frames.
    #[arg(long, env = "VID2TUT_OFFLINE")]
    offline: bool,

    /// Download and upload timeout in seconds.
    #[arg(long, env = "VID2TUT_DOWNLOAD_TIMEOUT", default_value_t = 600)]
    download_timeout: u64,

    /// Print the tutorial as JSON instead of the document path.
    #[arg(long, env = "VID2TUT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "VID2TUT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "VID2TUT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "VID2TUT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build pipeline ───────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let pipeline = build_pipeline(&cli, config)?;

    let job = match cli.job_id {
        Some(ref id) => JobId::parse(id).context("Invalid --job-id")?,
        None => JobId::new(),
    };
    if !cli.quiet && !cli.json {
        eprintln!(
            "{} Job {}  {}",
            cyan("◆"),
            bold(job.as_str()),
            dim(&pipeline.workspace(&job).root().display().to_string())
        );
    }

    // ── Run job ──────────────────────────────────────────────────────────
    let tutorial = pipeline
        .run(&job, &cli.url)
        .await
        .context("Tutorial generation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&tutorial).context("Failed to serialise tutorial")?;
        println!("{json}");
    } else {
        println!("{}", tutorial.document_path.display());
        if !cli.quiet && !show_progress {
            eprintln!(
                "Generated '{}' with {} steps",
                tutorial.title,
                tutorial.steps.len()
            );
        }
    }

    Ok(())
}

/// Map CLI args to `TutorialConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TutorialConfig> {
    let mut builder = TutorialConfig::builder()
        .jobs_root(&cli.jobs_dir)
        .frame_interval_secs(cli.interval)
        .max_candidates(cli.max_candidates)
        .concurrency(cli.concurrency)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Wire the collaborators the flags ask for.
fn build_pipeline(cli: &Cli, config: TutorialConfig) -> Result<TutorialPipeline> {
    let status = Arc::new(InMemoryStatusStore::new());
    let transcriber = WhisperApiTranscriber::from_env(config.download_timeout_secs)
        .context("Speech-to-text is not configured")?;

    let pipeline = if cli.offline {
        TutorialPipeline::new(config, status, Arc::new(transcriber))
            .with_structurer(Arc::new(OfflineStructurer))
            .with_scorer(Arc::new(OfflineScorer))
    } else {
        let provider = vid2tutorial::pipeline::llm::resolve_provider(&config)
            .context("No LLM provider available (use --offline to skip)")?;
        TutorialPipeline::new(config, status, Arc::new(transcriber)).with_provider(provider)
    };

    let pipeline = if cli.direct {
        let timeout = pipeline.config().download_timeout_secs;
        pipeline.with_fetcher(Arc::new(HttpFetcher::new(timeout)?))
    } else {
        pipeline.with_fetcher(Arc::new(YtDlpFetcher::new()))
    };

    Ok(pipeline)
}
