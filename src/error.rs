use std::path::PathBuf;

use thiserror::Error;

use crate::io::VolumeError;
use crate::models::Stage;
use crate::stages::NormalizeError;
use crate::tools::ToolError;

/// Fatal errors that stop the whole run before (or instead of) producing output
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("case list not found: {0:?}")]
    CaseListNotFound(PathBuf),

    #[error("failed to read case list {path:?}: {source}")]
    CaseListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("case list {0:?} contains no cases")]
    EmptyCaseList(PathBuf),

    #[error("unrecognized volume format: {0:?} (expected .nrrd, .nhdr, .nii or .nii.gz)")]
    UnknownFormat(PathBuf),

    #[error("cases {first:?} and {second:?} would write the same output files")]
    DuplicateCase { first: PathBuf, second: PathBuf },

    #[error("case file not found: {0:?}")]
    CaseNotFound(PathBuf),

    #[error("reference volume not found: {0:?}")]
    ReferenceNotFound(PathBuf),

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("no cases remaining after the {0} stage")]
    NoCasesRemaining(Stage),
}

/// Errors confined to a single case; the case is dropped from later stages
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("volume {path:?} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        path: PathBuf,
        actual: Vec<usize>,
        expected: [usize; 3],
    },

    #[error("worker crashed: {0}")]
    WorkerCrashed(String),
}
