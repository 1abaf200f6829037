//! Frame sampling: decode one frame every `interval` seconds.
//!
//! ## Why seek per tick instead of decoding the whole stream?
//!
//! A 20-minute video at 30 fps is 36 000 frames, of which a 10-second cadence
//! keeps 120. Seeking to each tick and decoding only the nearest frame keeps
//! the cost proportional to the number of ticks, not to the video length.
//!
//! ## Failure policy
//!
//! If the source cannot be probed at all, the stage fails. A decode failure
//! at an individual tick (corrupt GOP, seek past the last keyframe) only
//! skips that tick. A pass that decodes nothing fails the stage too, since
//! no step could be illustrated.

use crate::error::TutorialError;
use crate::job::JobWorkspace;
use crate::output::FrameRecord;
use crate::pipeline::encode;
use crate::services::VideoDecoder;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The tick sequence `0, I, 2I, …` while `t < D`.
///
/// Tick `k` is computed as `k · I` so long videos don't accumulate
/// floating-point drift. Cloning restarts nothing; call
/// [`FrameSampler::ticks`] again for a fresh pass.
#[derive(Debug, Clone)]
pub struct SampleTicks {
    interval: f64,
    duration: f64,
    next: u64,
}

impl SampleTicks {
    pub fn new(duration: f64, interval: f64) -> Self {
        Self {
            interval,
            duration,
            next: 0,
        }
    }
}

impl Iterator for SampleTicks {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.interval.is_nan() || self.interval <= 0.0 || !self.duration.is_finite() {
            return None;
        }
        let t = self.next as f64 * self.interval;
        if t >= self.duration {
            return None;
        }
        self.next += 1;
        Some(t)
    }
}

/// Samples and persists frames of one job's video.
pub struct FrameSampler {
    decoder: Arc<dyn VideoDecoder>,
    source: PathBuf,
    workspace: JobWorkspace,
    duration: f64,
    interval: f64,
    jpeg_quality: u8,
}

impl FrameSampler {
    /// Open `source` by probing its duration.
    ///
    /// # Errors
    /// Whatever the decoder reports when the source cannot be opened
    /// (typically [`TutorialError::SourceUnreadable`]).
    pub fn open(
        decoder: Arc<dyn VideoDecoder>,
        source: &Path,
        workspace: &JobWorkspace,
        interval: f64,
        jpeg_quality: u8,
    ) -> Result<Self, TutorialError> {
        let duration = decoder.probe_duration(source)?;
        if !duration.is_finite() || duration < 0.0 {
            return Err(TutorialError::SourceUnreadable {
                path: source.to_path_buf(),
                detail: format!("invalid duration {duration}"),
            });
        }
        info!("Video duration: {:.2}s, sampling every {}s", duration, interval);

        Ok(Self {
            decoder,
            source: source.to_path_buf(),
            workspace: workspace.clone(),
            duration,
            interval,
            jpeg_quality,
        })
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// A fresh tick sequence for this video.
    pub fn ticks(&self) -> SampleTicks {
        SampleTicks::new(self.duration, self.interval)
    }

    /// Lazily decode and persist one frame per tick.
    ///
    /// Ticks that fail to decode are skipped. Errors yielded by the
    /// iterator are write failures, which callers should treat as fatal.
    pub fn frames(&self) -> impl Iterator<Item = Result<FrameRecord, TutorialError>> + '_ {
        self.ticks()
            .filter_map(move |t| match self.decoder.decode_at(&self.source, t) {
                Ok(image) => Some(self.persist(t, image)),
                Err(e) => {
                    warn!("Skipping frame at {:.2}s: {}", t, e);
                    None
                }
            })
    }

    fn persist(&self, timestamp: f64, image: DynamicImage) -> Result<FrameRecord, TutorialError> {
        let encoded = encode::encode_frame(&image, self.jpeg_quality).map_err(|e| {
            TutorialError::FrameWriteFailed {
                timestamp,
                detail: e.to_string(),
            }
        })?;

        let path = self.workspace.frame_path(timestamp);
        std::fs::write(&path, &encoded.jpeg).map_err(|e| TutorialError::FrameWriteFailed {
            timestamp,
            detail: format!("{}: {}", path.display(), e),
        })?;
        debug!("Frame {:.2}s → {}", timestamp, path.display());

        Ok(FrameRecord {
            timestamp,
            image,
            encoded: encoded.base64,
            path,
        })
    }
}

/// Run a full sampling pass on the blocking pool.
///
/// `on_frame(timestamp, total_ticks)` is invoked for every persisted frame.
///
/// # Errors
/// - The source cannot be opened
/// - A frame cannot be written
/// - No tick decoded successfully ([`TutorialError::NoFramesExtracted`])
pub async fn sample_frames<F>(
    decoder: Arc<dyn VideoDecoder>,
    source: &Path,
    workspace: &JobWorkspace,
    interval: f64,
    jpeg_quality: u8,
    on_frame: F,
) -> Result<Vec<FrameRecord>, TutorialError>
where
    F: Fn(f64, usize) + Send + 'static,
{
    let source = source.to_path_buf();
    let workspace = workspace.clone();

    tokio::task::spawn_blocking(move || {
        let sampler = FrameSampler::open(decoder, &source, &workspace, interval, jpeg_quality)?;
        let total_ticks = sampler.ticks().count();

        let mut frames = Vec::with_capacity(total_ticks);
        for frame in sampler.frames() {
            let mut frame = frame?;
            // Matching reads only `encoded`.
            frame.release_pixels();
            on_frame(frame.timestamp, total_ticks);
            frames.push(frame);
        }

        if frames.is_empty() {
            return Err(TutorialError::NoFramesExtracted {
                path: source.clone(),
                duration: sampler.duration(),
            });
        }
        info!("Extracted {}/{} frames", frames.len(), total_ticks);
        Ok(frames)
    })
    .await
    .map_err(|e| TutorialError::Internal(format!("Sampling task panicked: {}", e)))?
}

/// [`VideoDecoder`] backed by the `ffprobe` / `ffmpeg` command-line tools.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit binaries instead of looking them up on `PATH`.
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn probe_duration(&self, path: &Path) -> Result<f64, TutorialError> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()
            .map_err(|e| TutorialError::ToolUnavailable {
                tool: self.ffprobe.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(TutorialError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            TutorialError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: "ffprobe reported no duration".into(),
            }
        })
    }

    fn decode_at(&self, path: &Path, timestamp: f64) -> Result<DynamicImage, TutorialError> {
        // -ss before -i seeks on the demuxer, then decodes forward to the
        // nearest frame at or after the target.
        let output = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-ss")
            .arg(format!("{timestamp:.3}"))
            .arg("-i")
            .arg(path)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("-")
            .output()
            .map_err(|e| TutorialError::ToolUnavailable {
                tool: self.ffmpeg.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(TutorialError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: format!(
                    "no frame at {:.2}s: {}",
                    timestamp,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png).map_err(|e| {
            TutorialError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: format!("undecodable frame at {:.2}s: {}", timestamp, e),
            }
        })
    }
}

/// Parse ffprobe's `format=duration` output (`"123.456000\n"`, or `N/A`).
fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use image::{Rgb, RgbImage};
    use std::collections::HashSet;

    /// Decoder that paints each frame a shade derived from its timestamp and
    /// fails on the given ticks.
    struct SyntheticDecoder {
        duration: Option<f64>,
        broken: HashSet<u64>,
    }

    impl VideoDecoder for SyntheticDecoder {
        fn probe_duration(&self, path: &Path) -> Result<f64, TutorialError> {
            self.duration.ok_or_else(|| TutorialError::SourceUnreadable {
                path: path.to_path_buf(),
                detail: "moov atom not found".into(),
            })
        }

        fn decode_at(&self, path: &Path, timestamp: f64) -> Result<DynamicImage, TutorialError> {
            if self.broken.contains(&(timestamp as u64)) {
                return Err(TutorialError::SourceUnreadable {
                    path: path.to_path_buf(),
                    detail: "corrupt packet".into(),
                });
            }
            let shade = (timestamp as u8).wrapping_mul(3);
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([shade, 0, 0]))))
        }
    }

    async fn workspace() -> (tempfile::TempDir, JobWorkspace) {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::new(tmp.path(), &JobId::new());
        ws.create().await.unwrap();
        (tmp, ws)
    }

    #[test]
    fn hundred_seconds_every_ten_gives_ten_ticks() {
        let ticks: Vec<f64> = SampleTicks::new(100.0, 10.0).collect();
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks.first(), Some(&0.0));
        assert_eq!(ticks.last(), Some(&90.0));
    }

    #[test]
    fn ticks_stay_below_duration() {
        let ticks: Vec<f64> = SampleTicks::new(95.5, 10.0).collect();
        assert_eq!(ticks.len(), 10);
        assert!(ticks.iter().all(|t| *t >= 0.0 && *t < 95.5));

        let ticks: Vec<f64> = SampleTicks::new(1.0, 0.1).collect();
        assert_eq!(ticks.len(), 10);
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn degenerate_ticks_are_empty() {
        assert_eq!(SampleTicks::new(0.0, 10.0).count(), 0);
        assert_eq!(SampleTicks::new(10.0, 0.0).count(), 0);
        assert_eq!(SampleTicks::new(f64::INFINITY, 1.0).count(), 0);
    }

    #[test]
    fn parse_duration_variants() {
        assert_eq!(parse_duration("123.456000\n"), Some(123.456));
        assert_eq!(parse_duration("\n  42\n"), Some(42.0));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn sampler_is_restartable_and_persists_frames() {
        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: Some(30.0),
            broken: HashSet::new(),
        });
        let sampler = FrameSampler::open(decoder, Path::new("video.mp4"), &ws, 10.0, 80).unwrap();

        let first: Vec<f64> = sampler.frames().map(|f| f.unwrap().timestamp).collect();
        let second: Vec<f64> = sampler.frames().map(|f| f.unwrap().timestamp).collect();
        assert_eq!(first, vec![0.0, 10.0, 20.0]);
        assert_eq!(first, second);

        for t in first {
            assert!(ws.frame_path(t).is_file());
        }
    }

    #[tokio::test]
    async fn decode_failure_skips_only_that_tick() {
        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: Some(50.0),
            broken: [20u64].into_iter().collect(),
        });

        let frames = sample_frames(decoder, Path::new("v.mp4"), &ws, 10.0, 80, |_, _| {})
            .await
            .unwrap();
        let ts: Vec<f64> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(ts, vec![0.0, 10.0, 30.0, 40.0]);
        assert!(frames.iter().all(|f| !f.encoded.is_empty()));
        assert!(!ws.frame_path(20.0).exists());
    }

    #[tokio::test]
    async fn full_pass_releases_decoded_pixels() {
        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: Some(20.0),
            broken: HashSet::new(),
        });

        let lazy: Vec<FrameRecord> = FrameSampler::open(decoder.clone(), Path::new("v.mp4"), &ws, 10.0, 80)
            .unwrap()
            .frames()
            .map(|f| f.unwrap())
            .collect();
        assert!(lazy.iter().all(|f| f.image.width() == 8));

        let frames = sample_frames(decoder, Path::new("v.mp4"), &ws, 10.0, 80, |_, _| {})
            .await
            .unwrap();
        assert_eq!(frames.len(), 2);
        for f in &frames {
            assert_eq!((f.image.width(), f.image.height()), (0, 0));
            assert!(!f.encoded.is_empty());
            assert!(f.path.is_file());
        }
    }

    #[tokio::test]
    async fn unopenable_source_is_fatal() {
        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: None,
            broken: HashSet::new(),
        });

        let err = sample_frames(decoder, Path::new("v.mp4"), &ws, 10.0, 80, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TutorialError::SourceUnreadable { .. }));
    }

    #[tokio::test]
    async fn nothing_decoded_is_fatal() {
        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: Some(15.0),
            broken: [0u64, 10].into_iter().collect(),
        });

        let err = sample_frames(decoder, Path::new("v.mp4"), &ws, 10.0, 80, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TutorialError::NoFramesExtracted { .. }));
    }

    #[tokio::test]
    async fn on_frame_reports_total_ticks() {
        use std::sync::Mutex;

        let (_tmp, ws) = workspace().await;
        let decoder = Arc::new(SyntheticDecoder {
            duration: Some(25.0),
            broken: HashSet::new(),
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        sample_frames(decoder, Path::new("v.mp4"), &ws, 10.0, 80, move |t, total| {
            sink.lock().unwrap().push((t, total));
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![(0.0, 3), (10.0, 3), (20.0, 3)]);
    }
}
