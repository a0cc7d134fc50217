use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::io::{strip_tags, write_manifest};
use crate::models::{CaseFailure, NormalizedVolume, RunPaths, Tagged, WARPED_TAG};

/// Result of Stage 5: every manifest written, with its entry count
#[derive(Debug, Clone)]
pub struct Stage5Result {
    pub manifests: Vec<(PathBuf, usize)>,
}

/// Execute Stage 5: write the run manifests
///
/// `merged` must be in slot order, `arrays` in sagittal, coronal, axial order.
pub fn execute_stage5(
    paths: &RunPaths,
    arrays: &[PathBuf],
    merged: &[Tagged<NormalizedVolume>],
    failures: &[CaseFailure],
) -> Result<Stage5Result> {
    let mut manifests = Vec::with_capacity(5);

    let merged_manifest = paths.merged_manifest();
    let count = write_manifest(&merged_manifest, arrays.iter().map(|p| p.display().to_string()))?;
    manifests.push((merged_manifest, count));

    let registered = paths.registered_manifest();
    let count = write_manifest(
        &registered,
        merged
            .iter()
            .map(|t| t.value.registered.warped.display().to_string()),
    )?;
    manifests.push((registered.clone(), count));

    let transforms = paths.transform_manifest();
    let count = write_manifest(
        &transforms,
        merged
            .iter()
            .map(|t| t.value.registered.transform.display().to_string()),
    )?;
    manifests.push((transforms, count));

    let target = paths.target_manifest();
    let count = strip_tags(&registered, &target, &[WARPED_TAG])?;
    manifests.push((target, count));

    manifests.push(write_failed_manifest(paths, failures)?);

    for (path, count) in &manifests {
        info!("Wrote {} entries to {:?}", count, path);
    }

    Ok(Stage5Result { manifests })
}

/// Write `failed_cases.txt`, in case order, even when there are no failures
pub fn write_failed_manifest(paths: &RunPaths, failures: &[CaseFailure]) -> Result<(PathBuf, usize)> {
    let mut ordered: Vec<&CaseFailure> = failures.iter().collect();
    ordered.sort_by_key(|f| f.case.index);

    let path = paths.failed_manifest();
    let count = write_manifest(&path, ordered.iter().map(|f| f.manifest_line()))?;
    Ok((path, count))
}
