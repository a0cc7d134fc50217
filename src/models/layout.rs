use std::path::{Path, PathBuf};

use super::View;

pub const MERGED_MANIFEST: &str = "merged_cases.txt";
pub const REGISTERED_MANIFEST: &str = "ants_cases.txt";
pub const TRANSFORM_MANIFEST: &str = "mat_cases.txt";
pub const TARGET_MANIFEST: &str = "target_cases.txt";
pub const FAILED_MANIFEST: &str = "failed_cases.txt";

/// Where a run writes its shared outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Directory receiving stores, arrays, manifests and the report
    pub output_dir: PathBuf,
    /// Run name, taken from the case list file stem
    pub run_name: String,
}

impl RunPaths {
    pub fn new(output_dir: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_name: run_name.into(),
        }
    }

    fn file(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Flat binary store for a view: `<run>_binary_<s|c|a>`
    pub fn binary_store(&self, view: View) -> PathBuf {
        self.file(format!("{}_binary_{}", self.run_name, view.store_tag()))
    }

    /// Archival array for a view: `<run>-casefile-<view>.npy`
    pub fn merged_array(&self, view: View) -> PathBuf {
        self.file(format!("{}-casefile-{}.npy", self.run_name, view.name()))
    }

    pub fn merged_manifest(&self) -> PathBuf {
        self.file(MERGED_MANIFEST)
    }

    pub fn registered_manifest(&self) -> PathBuf {
        self.file(REGISTERED_MANIFEST)
    }

    pub fn transform_manifest(&self) -> PathBuf {
        self.file(TRANSFORM_MANIFEST)
    }

    pub fn target_manifest(&self) -> PathBuf {
        self.file(TARGET_MANIFEST)
    }

    pub fn failed_manifest(&self) -> PathBuf {
        self.file(FAILED_MANIFEST)
    }

    /// JSON run report: `<run>-report.json`
    pub fn report(&self) -> PathBuf {
        self.file(format!("{}-report.json", self.run_name))
    }
}
