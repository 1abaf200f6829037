//! Asynchronous job submission and polling.
//!
//! [`JobManager`] is the surface a service front-end sits on: `submit`
//! returns a job id immediately and runs the pipeline on a tokio task;
//! `status`, `tutorial` and `frame_path` answer polls for any job the
//! status store tracks. A failed job reports its error only through its
//! [`StatusRecord`].

use crate::convert::TutorialPipeline;
use crate::error::TutorialError;
use crate::job::JobId;
use crate::output::Tutorial;
use crate::status::{Stage, StatusRecord};
use std::path::PathBuf;
use tracing::{debug, info};

/// Submits jobs to a [`TutorialPipeline`] and answers polls about them.
#[derive(Clone)]
pub struct JobManager {
    pipeline: TutorialPipeline,
}

impl JobManager {
    pub fn new(pipeline: TutorialPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &TutorialPipeline {
        &self.pipeline
    }

    /// Register a new job for `url` and start it in the background.
    ///
    /// The job is `queued` by the time this returns. Must be called from
    /// within a tokio runtime.
    pub fn submit(&self, url: impl Into<String>) -> Result<JobId, TutorialError> {
        let job = JobId::new();
        self.pipeline.register(&job)?;

        let url = url.into();
        let pipeline = self.pipeline.clone();
        let id = job.clone();
        info!("Job {} submitted for {}", job, url);
        tokio::spawn(async move {
            // The outcome is recorded in the status store.
            if let Err(e) = pipeline.execute(&id, &url).await {
                debug!("Job {} ended with error: {}", id, e);
            }
        });

        Ok(job)
    }

    /// Latest status of `job`.
    pub fn status(&self, job: &JobId) -> Result<StatusRecord, TutorialError> {
        self.pipeline
            .status_store()
            .get(job)
            .ok_or_else(|| TutorialError::JobNotFound(job.to_string()))
    }

    /// The finished tutorial of a `completed` job.
    ///
    /// # Errors
    /// - [`TutorialError::JobNotFound`] for untracked ids
    /// - [`TutorialError::NotReady`] before `completed` (including `error`)
    pub async fn tutorial(&self, job: &JobId) -> Result<Tutorial, TutorialError> {
        let status = self.status(job)?;
        if status.stage != Stage::Completed {
            return Err(TutorialError::NotReady {
                job: job.to_string(),
                stage: status.stage,
            });
        }

        let path = self.pipeline.workspace(job).document_json_path();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| TutorialError::Internal(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| TutorialError::Internal(format!("{}: {}", path.display(), e)))
    }

    /// Path of a sampled frame of `job`, by file name.
    ///
    /// Names with path separators or `..` are rejected.
    pub fn frame_path(&self, job: &JobId, name: &str) -> Result<PathBuf, TutorialError> {
        self.status(job)?;
        self.pipeline
            .workspace(job)
            .existing_frame(name)
            .ok_or_else(|| TutorialError::FrameNotFound {
                job: job.to_string(),
                name: name.to_string(),
            })
    }
}
