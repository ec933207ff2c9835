//! Typed error hierarchy for the fabula pipeline.
//!
//! Four enums cover the subsystems:
//! - `ValidationError` — structural schema failures with a precise field path
//! - `GenerationError` — failures of the external text-generation boundary
//! - `CheckpointError` — persistence failures around project snapshots
//! - `PipelineError` — terminal run-level failures surfaced to the caller
//!
//! Only review rejections and `GenerationError` are retried by the
//! orchestrator; everything else propagates without retry.

use crate::gate::ReviewFeedback;
use crate::stage::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// A structural schema failure, naming the exact field path that is
/// missing or malformed. Never raised for well-formed-but-weak content;
/// that is the quality gate's job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Failures of an external generation or review call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model output could not be parsed into the expected shape: {0}")]
    MalformedOutput(String),

    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("generation call timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

/// Errors from the checkpoint manager.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no saved state for project {project_id}")]
    NotFound { project_id: String },

    #[error("no snapshot for project {project_id} at stage {stage}")]
    StageNotFound { project_id: String, stage: Stage },

    #[error("another run holds the lock for project {project_id}")]
    Locked { project_id: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Terminal failure of a pipeline run. The project always remains
/// resumable from its last approved checkpoint.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("stage {stage} failed after {attempts} attempts")]
    RetryBudgetExhausted {
        stage: Stage,
        attempts: u32,
        feedback: ReviewFeedback,
    },

    #[error("a run is already active for project {project_id}")]
    ConcurrencyConflict { project_id: String },

    #[error("run cancelled before stage {stage}")]
    Cancelled { stage: Stage },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
