//! Job identity and the per-job working directory.
//!
//! Every job owns `<jobs_root>/<job_id>/`:
//!
//! ```text
//! <job_id>/
//!   downloaded_video.<ext>
//!   audio.mp3                    (speech-to-text input, when extracted)
//!   transcription_result.json    (transcript cache)
//!   frames/frame_<t>.jpg         (one per sampled tick)
//!   output/tutorial.md
//!   output/tutorial.json
//! ```
//!
//! Nothing here is ever deleted by the pipeline; failed jobs keep their
//! directory for post-mortem inspection.

use crate::error::TutorialError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Opaque unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (e.g. to resume a job directory).
    ///
    /// The id becomes a directory name, so it must be a single path
    /// component.
    pub fn parse(s: &str) -> Result<Self, TutorialError> {
        if !is_plain_file_name(s) {
            return Err(TutorialError::InvalidConfig(format!(
                "job id '{s}' must be a single path component"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The private directory tree of one job.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    pub const TRANSCRIPT_FILE: &'static str = "transcription_result.json";
    pub const DOCUMENT_FILE: &'static str = "tutorial.md";
    pub const DOCUMENT_JSON_FILE: &'static str = "tutorial.json";

    /// Workspace for `job` under `jobs_root`. Does not touch the disk.
    pub fn new(jobs_root: &Path, job: &JobId) -> Self {
        Self {
            root: jobs_root.join(job.as_str()),
        }
    }

    /// Create the job directory with its `frames/` and `output/` subdirs.
    pub async fn create(&self) -> Result<(), TutorialError> {
        for dir in [self.frames_dir(), self.output_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| TutorialError::write_failed(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    /// Where the downloaded media lands for a given container extension.
    pub fn video_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("downloaded_video.{extension}"))
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.root.join(Self::TRANSCRIPT_FILE)
    }

    pub fn document_path(&self) -> PathBuf {
        self.output_dir().join(Self::DOCUMENT_FILE)
    }

    pub fn document_json_path(&self) -> PathBuf {
        self.output_dir().join(Self::DOCUMENT_JSON_FILE)
    }

    /// Path of the frame sampled at `timestamp` seconds.
    pub fn frame_path(&self, timestamp: f64) -> PathBuf {
        self.frames_dir().join(frame_file_name(timestamp))
    }

    /// Resolve a frame by file name, refusing anything outside `frames/`.
    pub fn existing_frame(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(name) {
            return None;
        }
        let path = self.frames_dir().join(name);
        path.is_file().then_some(path)
    }
}

/// Stable frame file name for a tick: `frame_<t with 2 decimals>.jpg`.
pub fn frame_file_name(timestamp: f64) -> String {
    format!("frame_{timestamp:.2}.jpg")
}

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// see either the old file or the complete new one.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), TutorialError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| TutorialError::write_failed(&path, e))?;
        tmp.write_all(&bytes)
            .map_err(|e| TutorialError::write_failed(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| TutorialError::write_failed(&path, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| TutorialError::Internal(format!("Write task panicked: {}", e)))?
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
