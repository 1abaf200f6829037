//! Pipeline stages for video-to-tutorial conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a local speech-to-text engine) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! acquire ──▶ transcribe ──▶ sample ──▶ structure ──▶ matcher ──▶ document
//!  (URL)      (cached STT)   (frames)   (outline)     (vision)    (md+json)
//! ```
//!
//! 1. [`acquire`]: resolve the URL and download the media into the job
//! 2. [`transcribe`]: speech-to-text behind a per-job JSON cache
//! 3. [`sample`]: decode one frame per interval; runs in
//!    `spawn_blocking` because decoding is CPU-bound
//! 4. [`encode`]: JPEG-encode and base64-wrap each frame for disk and
//!    for the vision request body
//! 5. [`structure`]: transcript → outline via the text service, with a
//!    deterministic fallback
//! 6. [`matcher`]: choose one frame per step via the vision service
//! 7. [`document`]: render and atomically write the tutorial
//!
//! [`llm`] holds the `edgequake-llm` adapters used by stages 5 and 6.

pub mod acquire;
pub mod document;
pub mod encode;
pub mod llm;
pub mod matcher;
pub mod sample;
pub mod structure;
pub mod transcribe;
