//! Progress-callback trait for per-job pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::TutorialConfigBuilder::progress_callback`] to receive
//! events as a job moves through its stages, as frames are sampled and as
//! steps are matched to frames.
//!
//! The status store already holds the latest [`StatusRecord`] for polling;
//! the callback is the push-side counterpart for callers that want every
//! event (terminal progress bars, WebSocket fan-out, metrics).
//!
//! # Example
//!
//! ```rust
//! use vid2tutorial::{JobId, PipelineProgressCallback, StatusRecord, TutorialConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     matched: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_step_matched(&self, _job: &JobId, step_number: usize, total_steps: usize, timestamp: f64) {
//!         self.matched.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Step {}/{} → {:.2}s", step_number, total_steps, timestamp);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { matched: AtomicUsize::new(0) });
//!
//! let config = TutorialConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobId;
use crate::status::StatusRecord;
use std::sync::Arc;

/// Called by the pipeline as a job progresses.
///
/// Implementations must be `Send + Sync`: several jobs may run at once, and
/// `on_step_matched` may be called from concurrently scored steps. All
/// methods have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called after every successful stage transition with the new record.
    fn on_stage(&self, job: &JobId, record: &StatusRecord) {
        let _ = (job, record);
    }

    /// Called for each frame that was decoded and persisted.
    ///
    /// # Arguments
    /// * `timestamp`  : seek position of the frame in seconds
    /// * `total_ticks`: number of ticks the sampling pass will attempt
    fn on_frame_sampled(&self, job: &JobId, timestamp: f64, total_ticks: usize) {
        let _ = (job, timestamp, total_ticks);
    }

    /// Called once a step has its frame.
    fn on_step_matched(&self, job: &JobId, step_number: usize, total_steps: usize, timestamp: f64) {
        let _ = (job, step_number, total_steps, timestamp);
    }

    /// Called once the document is written and the job is `completed`.
    fn on_job_complete(&self, job: &JobId, total_steps: usize) {
        let _ = (job, total_steps);
    }

    /// Called when the job moves to `error`.
    fn on_job_error(&self, job: &JobId, error: &str) {
        let _ = (job, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TutorialConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Stage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        frames: AtomicUsize,
        matched: AtomicUsize,
        errors: Mutex<Vec<String>>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage(&self, _job: &JobId, record: &StatusRecord) {
            self.stages.lock().unwrap().push(record.stage);
        }

        fn on_frame_sampled(&self, _job: &JobId, _timestamp: f64, _total: usize) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }

        fn on_step_matched(&self, _job: &JobId, _n: usize, _total: usize, _t: f64) {
            self.matched.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _job: &JobId, error: &str) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let job = JobId::new();
        cb.on_stage(&job, &StatusRecord::queued());
        cb.on_frame_sampled(&job, 10.0, 10);
        cb.on_step_matched(&job, 1, 3, 10.0);
        cb.on_job_complete(&job, 3);
        cb.on_job_error(&job, "some error");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        let job = JobId::new();

        let record = StatusRecord::queued().advance(Stage::Downloading).unwrap();
        tracker.on_stage(&job, &record);
        tracker.on_frame_sampled(&job, 0.0, 2);
        tracker.on_frame_sampled(&job, 10.0, 2);
        tracker.on_step_matched(&job, 1, 1, 0.0);
        tracker.on_job_error(&job, "disk full");

        assert_eq!(*tracker.stages.lock().unwrap(), vec![Stage::Downloading]);
        assert_eq!(tracker.frames.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.matched.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.errors.lock().unwrap(), vec!["disk full"]);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn PipelineProgressCallback>();

        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_complete(&JobId::new(), 4);
    }
}
