use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::{Case, CaseIndex};
use crate::error::CaseError;

/// Pipeline stages that can drop a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Register,
    Normalize,
    Merge,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Register => "register",
            Stage::Normalize => "normalize",
            Stage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// A stage output carried together with the case that produced it
#[derive(Debug, Clone)]
pub struct Tagged<T> {
    pub case: Case,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn new(case: Case, value: T) -> Self {
        Self { case, value }
    }

    pub fn index(&self) -> CaseIndex {
        self.case.index
    }
}

/// Extracted b0 volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct B0Volume {
    pub path: PathBuf,
}

/// Registration output pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredVolume {
    /// Volume resampled into reference space
    pub warped: PathBuf,
    /// Rigid transform from the b0 volume to the reference
    pub transform: PathBuf,
}

/// Normalized volume, remembering the registration outputs it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedVolume {
    pub path: PathBuf,
    pub registered: RegisteredVolume,
}

/// A case excluded from the rest of the run
#[derive(Debug)]
pub struct CaseFailure {
    pub case: Case,
    /// Stage at which the case failed
    pub stage: Stage,
    pub error: CaseError,
}

impl CaseFailure {
    pub fn new(case: Case, stage: Stage, error: CaseError) -> Self {
        Self { case, stage, error }
    }

    /// Single manifest line: `<case path>\t<stage>\t<reason>`
    pub fn manifest_line(&self) -> String {
        let reason = self.error.to_string().replace(['\n', '\t'], " ");
        format!("{}\t{}\t{}", self.case.path.display(), self.stage, reason)
    }
}
