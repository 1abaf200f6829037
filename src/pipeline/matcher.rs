//! Step ↔ frame matching.
//!
//! ## Candidate windows
//!
//! Steps are assumed to follow the video in order and to take roughly equal
//! time, so step `i` of `K` looks at the `i`-th of `K` equal slices of the
//! `F` sampled frames: `[⌊i·F/K⌋, ⌊(i+1)·F/K⌋)`. Long slices are thinned by
//! a stride so at most `max_candidates` frames go out per vision call.
//!
//! ## Failure policy
//!
//! The vision service is optional. A step with one candidate never calls
//! it; a failed call or a reply without a number selects the middle
//! candidate. Matching therefore always yields exactly one frame per step.

use crate::config::TutorialConfig;
use crate::error::TutorialError;
use crate::output::{FrameRecord, MatchedStep, Outline, OutlineStep, TranscriptSegment};
use crate::prompts::frame_selection_prompt;
use crate::services::Scorer;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::{debug, info, warn};

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Frame index range of step `index` out of `total_steps` over `frame_count`
/// frames.
pub fn candidate_window(index: usize, total_steps: usize, frame_count: usize) -> Range<usize> {
    if total_steps == 0 {
        return 0..0;
    }
    let start = index * frame_count / total_steps;
    let end = (index + 1) * frame_count / total_steps;
    start..end.min(frame_count)
}

/// The frames shown to the scorer for step `index`.
///
/// Falls back to the very first frame when the step's window is empty
/// (more steps than frames).
pub fn select_candidates<'a>(
    frames: &'a [FrameRecord],
    index: usize,
    total_steps: usize,
    max_candidates: usize,
) -> Vec<&'a FrameRecord> {
    let window = candidate_window(index, total_steps, frames.len());
    if window.is_empty() {
        return frames.first().into_iter().collect();
    }

    let cap = max_candidates.min(frames.len()).max(1);
    let stride = (window.len() / cap).max(1);
    frames[window].iter().step_by(stride).take(cap).collect()
}

/// Extract the 1-based ordinal from a scorer reply, clamped into `[1, n]`.
///
/// Only the first run of digits counts, so `"Frame 3 (of 5)"` is 3.
pub fn parse_ordinal(reply: &str, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let digits = RE_DIGITS.find(reply)?.as_str();
    // A run too long for u64 is certainly above n.
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    Some((value.min(n as u64) as usize).max(1))
}

/// Pair every outline step with one frame.
///
/// Steps are scored up to `config.concurrency` at a time; the result keeps
/// outline order. `on_matched(step_number, total_steps, timestamp)` fires as
/// each step resolves.
///
/// # Errors
/// Only when `frames` is empty; service failures are absorbed.
pub async fn match_frames<F>(
    scorer: &dyn Scorer,
    outline: &Outline,
    frames: &[FrameRecord],
    segments: &[TranscriptSegment],
    config: &TutorialConfig,
    on_matched: F,
) -> Result<Vec<MatchedStep>, TutorialError>
where
    F: Fn(usize, usize, f64) + Sync,
{
    if frames.is_empty() {
        return Err(TutorialError::Internal("no frames to match steps against".into()));
    }

    let total = outline.steps.len();
    let on_matched = &on_matched;
    info!("Matching {} steps against {} frames", total, frames.len());

    // Collected first: a borrowing closure inside the stream makes the
    // returned future fail the `Send` bound of `tokio::spawn`.
    let pending: Vec<_> = outline
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| match_step(scorer, step, i, total, frames, segments, config, on_matched))
        .collect();

    let matched: Vec<MatchedStep> = stream::iter(pending)
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    Ok(matched)
}

#[allow(clippy::too_many_arguments)]
async fn match_step<F>(
    scorer: &dyn Scorer,
    step: &OutlineStep,
    index: usize,
    total: usize,
    frames: &[FrameRecord],
    segments: &[TranscriptSegment],
    config: &TutorialConfig,
    on_matched: &F,
) -> MatchedStep
where
    F: Fn(usize, usize, f64) + Sync,
{
    let candidates = select_candidates(frames, index, total, config.max_candidates);
    log_window(step, &candidates, segments);

    let chosen = choose_frame(scorer, step, &candidates).await;
    on_matched(step.step_number, total, chosen.timestamp);

    MatchedStep {
        step: step.clone(),
        frame_path: chosen.path.clone(),
        timestamp: chosen.timestamp,
    }
}

async fn choose_frame<'a>(
    scorer: &dyn Scorer,
    step: &OutlineStep,
    candidates: &[&'a FrameRecord],
) -> &'a FrameRecord {
    let n = candidates.len();
    if n == 1 {
        return candidates[0];
    }
    let middle = candidates[n / 2];

    let prompt = frame_selection_prompt(step, n);
    let images: Vec<&str> = candidates.iter().map(|f| f.encoded.as_str()).collect();

    match scorer.score(&prompt, &images).await {
        Ok(reply) => match parse_ordinal(&reply, n) {
            Some(ordinal) => {
                debug!("Step {}: scorer chose frame {}/{}", step.step_number, ordinal, n);
                candidates[ordinal - 1]
            }
            None => {
                warn!(
                    "Step {}: no frame number in reply {:?}, using middle candidate",
                    step.step_number, reply
                );
                middle
            }
        },
        Err(e) => {
            warn!("Step {}: {}, using middle candidate", step.step_number, e);
            middle
        }
    }
}

fn log_window(step: &OutlineStep, candidates: &[&FrameRecord], segments: &[TranscriptSegment]) {
    let (Some(first), Some(last)) = (candidates.first(), candidates.last()) else {
        return;
    };
    let spoken = segments
        .iter()
        .filter(|s| s.end >= first.timestamp && s.start <= last.timestamp)
        .count();
    debug!(
        "Step {}: {} candidates in {:.2}s–{:.2}s, {} transcript segments overlap",
        step.step_number,
        candidates.len(),
        first.timestamp,
        last.timestamp,
        spoken
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn frames(n: usize) -> Vec<FrameRecord> {
        (0..n)
            .map(|i| {
                let t = i as f64 * 10.0;
                FrameRecord {
                    timestamp: t,
                    image: DynamicImage::new_rgb8(1, 1),
                    encoded: format!("img{i}"),
                    path: PathBuf::from(crate::job::frame_file_name(t)),
                }
            })
            .collect()
    }

    fn outline(k: usize) -> Outline {
        Outline {
            title: "T".into(),
            introduction: String::new(),
            steps: (1..=k)
                .map(|n| OutlineStep {
                    step_number: n,
                    title: format!("Step {n}"),
                    explanation: String::new(),
                })
                .collect(),
        }
    }

    /// Replies with a fixed string and records every call.
    struct ScriptedScorer {
        reply: Result<String, ServiceError>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedScorer {
        fn new(reply: Result<&str, ServiceError>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Scorer for ScriptedScorer {
        async fn score(&self, _desc: &str, images: &[&str]) -> Result<String, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push(images.iter().map(|s| s.to_string()).collect());
            self.reply.clone()
        }
    }

    #[test]
    fn three_steps_over_ten_frames() {
        assert_eq!(candidate_window(0, 3, 10), 0..3);
        assert_eq!(candidate_window(1, 3, 10), 3..6);
        assert_eq!(candidate_window(2, 3, 10), 6..10);
    }

    #[test]
    fn windows_cover_every_frame_once() {
        for (k, f) in [(1, 1), (4, 9), (7, 100), (3, 2)] {
            let covered: usize = (0..k).map(|i| candidate_window(i, k, f).len()).sum();
            assert_eq!(covered, f, "k={k} f={f}");
        }
    }

    #[test]
    fn long_window_is_strided_and_capped() {
        let fs = frames(40);
        let picked = select_candidates(&fs, 0, 1, 8);
        let ts: Vec<f64> = picked.iter().map(|f| f.timestamp).collect();
        assert_eq!(ts, vec![0.0, 50.0, 100.0, 150.0, 200.0, 250.0, 300.0, 350.0]);

        let fs = frames(20);
        assert_eq!(select_candidates(&fs, 0, 1, 8).len(), 8);
    }

    #[test]
    fn empty_window_falls_back_to_first_frame() {
        let fs = frames(2);
        // 5 steps over 2 frames: step 0 gets [0, 0)
        assert!(candidate_window(0, 5, 2).is_empty());
        let picked = select_candidates(&fs, 0, 5, 8);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].timestamp, 0.0);
    }

    #[test]
    fn ordinal_parsing() {
        assert_eq!(parse_ordinal("3", 5), Some(3));
        assert_eq!(parse_ordinal("Frame 2 is best", 5), Some(2));
        assert_eq!(parse_ordinal("Frame 3 (of 5)", 5), Some(3));
        assert_eq!(parse_ordinal("42", 5), Some(5));
        assert_eq!(parse_ordinal("0", 5), Some(1));
        assert_eq!(parse_ordinal("99999999999999999999999", 4), Some(4));
        assert_eq!(parse_ordinal("the second one", 5), None);
        assert_eq!(parse_ordinal("", 5), None);
    }

    #[tokio::test]
    async fn one_step_one_frame_skips_scorer() {
        let scorer = ScriptedScorer::new(Ok("1"));
        let fs = frames(1);
        let matched = match_frames(&scorer, &outline(1), &fs, &[], &TutorialConfig::default(), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].timestamp, 0.0);
        assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_reply_selects_middle_candidate() {
        let scorer = ScriptedScorer::new(Ok("I like the blurry one"));
        let fs = frames(5);
        let matched = match_frames(&scorer, &outline(1), &fs, &[], &TutorialConfig::default(), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(matched[0].timestamp, 20.0);
    }

    #[tokio::test]
    async fn service_error_selects_middle_candidate() {
        let scorer = ScriptedScorer::new(Err(ServiceError::Unavailable { service: "vision" }));
        let fs = frames(4);
        let matched = match_frames(&scorer, &outline(1), &fs, &[], &TutorialConfig::default(), |_, _, _| {})
            .await
            .unwrap();
        assert_eq!(matched[0].timestamp, 20.0);
    }

    #[tokio::test]
    async fn reply_ordinal_picks_within_window() {
        let scorer = ScriptedScorer::new(Ok("Frame 2"));
        let fs = frames(10);
        let matched = match_frames(&scorer, &outline(3), &fs, &[], &TutorialConfig::default(), |_, _, _| {})
            .await
            .unwrap();

        let numbers: Vec<usize> = matched.iter().map(|m| m.step.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let ts: Vec<f64> = matched.iter().map(|m| m.timestamp).collect();
        assert_eq!(ts, vec![10.0, 40.0, 70.0]);

        let mut seen = scorer.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&vec!["img0".to_string(), "img1".into(), "img2".into()]));
        assert!(seen.contains(&vec!["img6".to_string(), "img7".into(), "img8".into(), "img9".into()]));
    }

    #[tokio::test]
    async fn order_is_preserved_with_sequential_scoring() {
        let scorer = ScriptedScorer::new(Ok("1"));
        let fs = frames(12);
        let config = TutorialConfig::builder().concurrency(1).build().unwrap();
        let reported = Mutex::new(Vec::new());

        let matched = match_frames(&scorer, &outline(4), &fs, &[], &config, |n, total, _| {
            reported.lock().unwrap().push((n, total));
        })
        .await
        .unwrap();

        assert_eq!(matched.len(), 4);
        assert_eq!(
            *reported.lock().unwrap(),
            vec![(1, 4), (2, 4), (3, 4), (4, 4)]
        );
    }

    #[tokio::test]
    async fn matching_runs_on_a_spawned_task() {
        let scorer: std::sync::Arc<dyn Scorer> = std::sync::Arc::new(ScriptedScorer::new(Ok("2")));
        let handle = tokio::spawn(async move {
            let fs = frames(10);
            let config = TutorialConfig::default();
            match_frames(scorer.as_ref(), &outline(3), &fs, &[], &config, |_, _, _| {}).await
        });

        let matched = handle.await.unwrap().unwrap();
        assert_eq!(matched.len(), 3);
        assert_eq!(matched[0].timestamp, 10.0);
    }

    #[tokio::test]
    async fn no_frames_is_an_error() {
        let scorer = ScriptedScorer::new(Ok("1"));
        let err = match_frames(&scorer, &outline(2), &[], &[], &TutorialConfig::default(), |_, _, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TutorialError::Internal(_)));
    }
}
