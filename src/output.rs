//! Data produced and consumed by the pipeline stages.

use crate::job::JobId;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The downloaded media of a job. Immutable once acquisition completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSource {
    /// Absolute path to the media file.
    pub path: PathBuf,
    /// Display title reported by the acquisition service.
    pub title: String,
    /// The URL the job was submitted with.
    pub url: String,
}

/// One timed chunk of speech. Silences between segments may be skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// The cached result of speech-to-text for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Whole-text concatenation as reported by the engine.
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    /// Build a transcript whose `text` is the space-joined segment texts.
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let text = join_segments(&segments);
        Self {
            text,
            segments,
            language: None,
        }
    }

    /// The text handed to the structuring service: segment texts joined by
    /// single spaces, or the engine's `text` when there are no segments.
    pub fn full_text(&self) -> String {
        if self.segments.is_empty() {
            self.text.trim().to_string()
        } else {
            join_segments(&self.segments)
        }
    }
}

fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A frame decoded at one sampling tick.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Seek position in seconds.
    pub timestamp: f64,
    /// Decoded pixels. Empty (0×0) after [`FrameRecord::release_pixels`];
    /// the JPEG at `path` and `encoded` still carry the frame.
    pub image: DynamicImage,
    /// Base64 JPEG ready to attach to a vision request.
    pub encoded: String,
    /// Persisted JPEG inside the job's `frames/` directory.
    pub path: PathBuf,
}

impl FrameRecord {
    /// Drop the decoded buffer once the frame is persisted and encoded.
    pub fn release_pixels(&mut self) {
        self.image = DynamicImage::new_rgb8(0, 0);
    }
}

/// One tutorial step as produced by the structuring stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineStep {
    /// 1-based, contiguous.
    pub step_number: usize,
    pub title: String,
    pub explanation: String,
}

/// Title, introduction and ordered steps of a tutorial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub introduction: String,
    pub steps: Vec<OutlineStep>,
}

/// An outline step paired with its illustrative frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedStep {
    #[serde(flatten)]
    pub step: OutlineStep,
    pub frame_path: PathBuf,
    pub timestamp: f64,
}

impl MatchedStep {
    /// File name of the chosen frame, as accepted by
    /// [`crate::manager::JobManager::frame_path`].
    pub fn frame_name(&self) -> Option<&str> {
        self.frame_path.file_name().and_then(|n| n.to_str())
    }
}

/// The finished tutorial of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tutorial {
    pub job_id: JobId,
    pub title: String,
    pub introduction: String,
    pub source_url: String,
    pub video_title: String,
    pub steps: Vec<MatchedStep>,
    /// Rendered Markdown document.
    pub document_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.into(),
        }
    }

    #[test]
    fn full_text_joins_trimmed_segments() {
        let t = Transcript::from_segments(vec![
            seg(0.0, 2.0, " Hello"),
            seg(5.0, 6.0, "   "),
            seg(6.0, 9.0, "world. "),
        ]);
        assert_eq!(t.full_text(), "Hello world.");
        assert_eq!(t.text, "Hello world.");
    }

    #[test]
    fn full_text_without_segments_uses_text() {
        let t = Transcript {
            text: "  only text ".into(),
            segments: vec![],
            language: Some("en".into()),
        };
        assert_eq!(t.full_text(), "only text");
    }

    #[test]
    fn matched_step_serialises_flat() {
        let m = MatchedStep {
            step: OutlineStep {
                step_number: 2,
                title: "Cut".into(),
                explanation: "Cut the board.".into(),
            },
            frame_path: PathBuf::from("jobs/x/frames/frame_20.00.jpg"),
            timestamp: 20.0,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["step_number"], 2);
        assert_eq!(v["title"], "Cut");
        assert_eq!(v["timestamp"], 20.0);
        assert_eq!(m.frame_name(), Some("frame_20.00.jpg"));
    }
}
