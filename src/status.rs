//! Per-job progress state: the stage machine and the shared status store.
//!
//! A job's observable state is a single [`StatusRecord`]. It only ever moves
//! forward through [`Stage`] and is replaced as a whole on every transition,
//! so a poller never sees a half-written record. All mutation goes through
//! [`StatusRecord::advance`] and [`StatusRecord::fail`]; the pipeline reaches
//! them via [`JobProgress`], which also forwards each new record to the
//! configured progress callback.

use crate::error::TutorialError;
use crate::job::JobId;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// One discrete phase of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Downloading,
    LoadingModel,
    Transcribing,
    ExtractingFrames,
    StructuringTutorial,
    MatchingFrames,
    Completed,
    Error,
}

impl Stage {
    /// Position in the forward sequence. `Error` sits outside it.
    fn ordinal(self) -> Option<u8> {
        match self {
            Stage::Queued => Some(0),
            Stage::Downloading => Some(1),
            Stage::LoadingModel => Some(2),
            Stage::Transcribing => Some(3),
            Stage::ExtractingFrames => Some(4),
            Stage::StructuringTutorial => Some(5),
            Stage::MatchingFrames => Some(6),
            Stage::Completed => Some(7),
            Stage::Error => None,
        }
    }

    /// Fixed progress checkpoint reported on entering this stage.
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::Queued | Stage::Downloading => 0,
            Stage::LoadingModel => 20,
            Stage::Transcribing => 40,
            Stage::ExtractingFrames => 60,
            Stage::StructuringTutorial => 70,
            Stage::MatchingFrames => 85,
            Stage::Completed => 100,
            Stage::Error => 0,
        }
    }

    /// `completed` and `error` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Downloading => "downloading",
            Stage::LoadingModel => "loading_model",
            Stage::Transcribing => "transcribing",
            Stage::ExtractingFrames => "extracting_frames",
            Stage::StructuringTutorial => "structuring_tutorial",
            Stage::MatchingFrames => "matching_frames",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The latest observable state of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub stage: Stage,
    /// 0–100, non-decreasing until `completed`; reset to 0 on `error`.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusRecord {
    /// The record every job starts with.
    pub fn queued() -> Self {
        Self {
            stage: Stage::Queued,
            progress: Stage::Queued.checkpoint(),
            message: None,
        }
    }

    /// Move forward to `next`, producing the replacement record.
    ///
    /// Stages may be skipped but never revisited; terminal stages are final.
    /// Use [`StatusRecord::fail`] to enter `error`.
    pub fn advance(&self, next: Stage) -> Result<StatusRecord, TutorialError> {
        let rejected = TutorialError::InvalidTransition {
            from: self.stage,
            to: next,
        };
        if self.stage.is_terminal() {
            return Err(rejected);
        }
        match (self.stage.ordinal(), next.ordinal()) {
            (Some(from), Some(to)) if to > from => Ok(StatusRecord {
                stage: next,
                progress: next.checkpoint().max(self.progress),
                message: None,
            }),
            _ => Err(rejected),
        }
    }

    /// Enter `error` from any non-error stage, carrying `message` verbatim.
    pub fn fail(&self, message: impl Into<String>) -> Result<StatusRecord, TutorialError> {
        if self.stage == Stage::Error {
            return Err(TutorialError::InvalidTransition {
                from: Stage::Error,
                to: Stage::Error,
            });
        }
        Ok(StatusRecord {
            stage: Stage::Error,
            progress: 0,
            message: Some(message.into()),
        })
    }

    /// Attach a human-readable note to the record.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Shared, process-wide status storage keyed by job id.
///
/// Implementations must make each operation atomic with respect to a single
/// key: a concurrent reader sees either the old or the new record.
pub trait StatusStore: Send + Sync {
    /// Latest record for `job`, if tracked.
    fn get(&self, job: &JobId) -> Option<StatusRecord>;

    /// Start tracking `job`. Returns `false` (and changes nothing) if the id
    /// is already tracked.
    fn insert(&self, job: &JobId, record: StatusRecord) -> bool;

    /// Unconditionally replace the record for `job`.
    fn set(&self, job: &JobId, record: StatusRecord);

    /// Atomically read-modify-write the record for `job`.
    ///
    /// `apply` returns the replacement, or `None` to leave the record as is.
    /// Returns the record stored after the call, or `None` if `job` is not
    /// tracked.
    fn update(
        &self,
        job: &JobId,
        apply: &mut dyn FnMut(&StatusRecord) -> Option<StatusRecord>,
    ) -> Option<StatusRecord>;
}

/// [`StatusStore`] backed by an `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryStatusStore {
    records: RwLock<HashMap<JobId, StatusRecord>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// A poisoned lock only means another writer panicked mid-`insert`; the map
// itself still holds whole records, so keep serving it.
impl StatusStore for InMemoryStatusStore {
    fn get(&self, job: &JobId) -> Option<StatusRecord> {
        let map = self.records.read().unwrap_or_else(|e| e.into_inner());
        map.get(job).cloned()
    }

    fn insert(&self, job: &JobId, record: StatusRecord) -> bool {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(job) {
            return false;
        }
        map.insert(job.clone(), record);
        true
    }

    fn set(&self, job: &JobId, record: StatusRecord) {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        map.insert(job.clone(), record);
    }

    fn update(
        &self,
        job: &JobId,
        apply: &mut dyn FnMut(&StatusRecord) -> Option<StatusRecord>,
    ) -> Option<StatusRecord> {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        let current = map.get_mut(job)?;
        if let Some(next) = apply(current) {
            *current = next;
        }
        Some(current.clone())
    }
}

/// The single writer of one job's status.
///
/// Owned by a pipeline run; every stage change goes through
/// [`JobProgress::advance`] or [`JobProgress::fail`].
pub struct JobProgress {
    job: JobId,
    store: Arc<dyn StatusStore>,
    callback: Option<ProgressCallback>,
}

impl JobProgress {
    pub fn new(job: JobId, store: Arc<dyn StatusStore>, callback: Option<ProgressCallback>) -> Self {
        Self {
            job,
            store,
            callback,
        }
    }

    pub fn job(&self) -> &JobId {
        &self.job
    }

    /// Enter `stage`, optionally with a note.
    pub fn advance(&self, stage: Stage, message: Option<String>) -> Result<StatusRecord, TutorialError> {
        let mut rejected = None;
        let stored = self.store.update(&self.job, &mut |current| {
            match current.advance(stage) {
                Ok(next) => Some(match message.clone() {
                    Some(m) => next.with_message(m),
                    None => next,
                }),
                Err(e) => {
                    rejected = Some(e);
                    None
                }
            }
        });

        if let Some(e) = rejected {
            return Err(e);
        }
        let record = stored.ok_or_else(|| TutorialError::JobNotFound(self.job.to_string()))?;
        debug!("Job {}: {} ({}%)", self.job, record.stage, record.progress);
        if let Some(ref cb) = self.callback {
            cb.on_stage(&self.job, &record);
        }
        Ok(record)
    }

    /// Move the job to `error` with `message`.
    ///
    /// A job that is already in `error` keeps its first message.
    pub fn fail(&self, message: &str) -> Option<StatusRecord> {
        let stored = self.store.update(&self.job, &mut |current| current.fail(message).ok());
        error!("Job {} failed: {}", self.job, message);
        if let Some(ref cb) = self.callback {
            cb.on_job_error(&self.job, message);
        }
        stored
    }
}
