use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::error::CaseError;
use crate::io::{open_store, read_shape, read_volume, write_npy_f32_bytes, FlatStoreWriter};
use crate::models::{
    CaseFailure, NormalizedVolume, RunPaths, Stage, StoreLayout, Tagged, View, DEFAULT_VOLUME_EDGE,
};

/// Configuration for Stage 4
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Edge length every merged volume must have
    pub volume_edge: usize,
    /// Delete the flat binary stores once the arrays are written
    pub remove_binary_stores: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            volume_edge: DEFAULT_VOLUME_EDGE,
            remove_binary_stores: false,
        }
    }
}

/// Files written by a successful merge
#[derive(Debug, Clone)]
pub struct MergedArrays {
    /// `.npy` arrays in sagittal, coronal, axial order
    pub arrays: Vec<PathBuf>,
    /// Flat stores left on disk (empty when removed)
    pub stores: Vec<PathBuf>,
    pub layout: StoreLayout,
}

/// Result of Stage 4
#[derive(Debug)]
pub struct Stage4Result {
    /// Accepted cases; position is the slot in every merged array
    pub merged: Vec<Tagged<NormalizedVolume>>,
    /// Cases rejected by header validation
    pub failures: Vec<CaseFailure>,
    /// `None` when no case passed validation
    pub output: Option<MergedArrays>,
}

/// Execute Stage 4: merge normalized volumes into three view tensors
///
/// 1. Validate every header against the configured edge, rejecting mismatches
/// 2. Preallocate and map one flat store per view
/// 3. Write each accepted case's oriented volume at its slot offset
/// 4. Reopen the stores read-only and write them out as `.npy` arrays
///
/// Per-case rejections happen before any byte is written. Errors after that
/// point abort the merge.
pub fn execute_stage4(
    volumes: Vec<Tagged<NormalizedVolume>>,
    paths: &RunPaths,
    config: &MergeConfig,
) -> Result<Stage4Result> {
    info!(
        "Stage {}: validating {} volumes (edge {})",
        Stage::Merge,
        volumes.len(),
        config.volume_edge
    );
    let (merged, failures) = validate_volumes(volumes, config.volume_edge);

    if merged.is_empty() {
        warn!("Stage {}: no volume passed validation", Stage::Merge);
        return Ok(Stage4Result {
            merged,
            failures,
            output: None,
        });
    }

    let output = merge_volumes(&merged, paths, config)?;
    info!(
        "Stage {}: {} succeeded, {} failed",
        Stage::Merge,
        merged.len(),
        failures.len()
    );

    Ok(Stage4Result {
        merged,
        failures,
        output: Some(output),
    })
}

/// Split volumes into those shaped (edge, edge, edge) and rejected cases
///
/// Only headers are read. Accepted volumes keep their relative order.
pub fn validate_volumes(
    volumes: Vec<Tagged<NormalizedVolume>>,
    edge: usize,
) -> (Vec<Tagged<NormalizedVolume>>, Vec<CaseFailure>) {
    let expected = [edge; 3];
    let mut accepted = Vec::with_capacity(volumes.len());
    let mut failures = Vec::new();

    for tagged in volumes {
        let checked = read_shape(&tagged.value.path)
            .map_err(CaseError::from)
            .and_then(|actual| {
                if actual == expected {
                    Ok(())
                } else {
                    Err(CaseError::ShapeMismatch {
                        path: tagged.value.path.clone(),
                        actual,
                        expected,
                    })
                }
            });

        match checked {
            Ok(()) => accepted.push(tagged),
            Err(error) => {
                warn!(
                    "Case {} ({:?}) failed at {}: {}",
                    tagged.index(),
                    tagged.case.path,
                    Stage::Merge,
                    error
                );
                failures.push(CaseFailure::new(tagged.case, Stage::Merge, error));
            }
        }
    }

    (accepted, failures)
}

/// Write accepted volumes into the three view stores and export them as arrays
pub fn merge_volumes(
    accepted: &[Tagged<NormalizedVolume>],
    paths: &RunPaths,
    config: &MergeConfig,
) -> Result<MergedArrays> {
    let layout = StoreLayout::new(config.volume_edge, accepted.len());
    info!(
        "Allocating {} stores of {} MiB each",
        View::ALL.len(),
        layout.total_bytes() / (1024 * 1024)
    );

    let mut writers = View::ALL
        .iter()
        .map(|&view| FlatStoreWriter::create(&paths.binary_store(view), layout))
        .collect::<Result<Vec<_>>>()?;

    for (slot, tagged) in accepted.iter().enumerate() {
        let volume = read_volume(&tagged.value.path)
            .with_context(|| format!("Failed to load validated volume for case {}", tagged.index()))?;
        if volume.data.shape() != layout.volume_shape() {
            bail!(
                "Volume {:?} changed shape to {:?} after validation",
                tagged.value.path,
                volume.data.shape()
            );
        }

        for (view, writer) in View::ALL.iter().zip(writers.iter_mut()) {
            writer.write_slab(slot, view.orient(volume.data.view()))?;
        }
        debug!("Case {} written to slot {}", tagged.index(), slot);
    }

    let stores = writers
        .into_iter()
        .map(FlatStoreWriter::finish)
        .collect::<Result<Vec<_>>>()?;

    let mut arrays = Vec::with_capacity(View::ALL.len());
    for (&view, store) in View::ALL.iter().zip(&stores) {
        let map = open_store(store, layout)?;
        let array = paths.merged_array(view);
        write_npy_f32_bytes(&array, &layout.shape(), &map)?;
        info!("Wrote {} array {:?} {:?}", view, layout.shape(), array);
        arrays.push(array);
    }

    let stores = if config.remove_binary_stores {
        for store in &stores {
            std::fs::remove_file(store)
                .with_context(|| format!("Failed to remove store: {:?}", store))?;
        }
        Vec::new()
    } else {
        stores
    };

    Ok(MergedArrays {
        arrays,
        stores,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_volume;
    use crate::models::{Case, CaseIndex, RegisteredVolume};
    use ndarray::{Array3, ArrayView3};

    const EDGE: usize = 4;

    fn normalized(dir: &std::path::Path, index: usize, data: &Array3<f32>) -> Tagged<NormalizedVolume> {
        let case = Case::new(CaseIndex(index), dir.join(format!("sub-{index}.nii.gz"))).unwrap();
        let path = case.names.normalized_volume();
        write_volume(&path, data, None).unwrap();
        let registered = RegisteredVolume {
            warped: case.names.warped_volume(),
            transform: case.names.transform_matrix(),
        };
        Tagged::new(case, NormalizedVolume { path, registered })
    }

    fn read_npy(path: &std::path::Path) -> (String, Vec<f32>) {
        let bytes = std::fs::read(path).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let header = String::from_utf8(bytes[10..10 + header_len].to_vec()).unwrap();
        let samples = bytes[10 + header_len..]
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        (header, samples)
    }

    fn marker_volume(value: f32) -> Array3<f32> {
        let mut data = Array3::<f32>::zeros((EDGE, EDGE, EDGE));
        data[[0, 1, 3]] = value;
        data
    }

    #[test]
    fn test_slabs_follow_case_order() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = vec![
            normalized(dir.path(), 0, &marker_volume(0.25)),
            normalized(dir.path(), 1, &marker_volume(0.5)),
            normalized(dir.path(), 2, &marker_volume(1.0)),
        ];
        let paths = RunPaths::new(dir.path(), "caselist");

        let result = execute_stage4(volumes, &paths, &MergeConfig {
            volume_edge: EDGE,
            remove_binary_stores: false,
        })
        .unwrap();

        let output = result.output.unwrap();
        assert_eq!(output.layout.shape(), [3 * EDGE, EDGE, EDGE]);
        assert_eq!(output.stores.len(), 3);
        assert!(output.stores.iter().all(|s| s.is_file()));

        let slab = EDGE * EDGE * EDGE;
        let expected = [0.25, 0.5, 1.0];
        for (view, array) in View::ALL.iter().zip(&output.arrays) {
            let (header, samples) = read_npy(array);
            assert!(header.contains("'shape': (12, 4, 4)"));
            assert_eq!(samples.len(), 3 * slab);

            for (slot, value) in expected.iter().enumerate() {
                let source = marker_volume(*value);
                let oriented: ArrayView3<f32> = view.orient(source.view());
                let want: Vec<f32> = oriented.iter().copied().collect();
                assert_eq!(&samples[slot * slab..(slot + 1) * slab], want.as_slice());
            }
        }
    }

    #[test]
    fn test_marker_voxel_position_per_view() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "marker");
        let volumes = vec![normalized(dir.path(), 0, &marker_volume(1.0))];

        let result = execute_stage4(volumes, &paths, &MergeConfig {
            volume_edge: EDGE,
            remove_binary_stores: true,
        })
        .unwrap();
        let output = result.output.unwrap();
        assert!(output.stores.is_empty());
        assert!(!paths.binary_store(View::Sagittal).exists());

        let flat = |[i, j, k]: [usize; 3]| (i * EDGE + j) * EDGE + k;
        let (_, sagittal) = read_npy(&paths.merged_array(View::Sagittal));
        let (_, coronal) = read_npy(&paths.merged_array(View::Coronal));
        let (_, axial) = read_npy(&paths.merged_array(View::Axial));
        assert_eq!(sagittal[flat([0, 1, 3])], 1.0);
        assert_eq!(coronal[flat([1, 0, 3])], 1.0);
        assert_eq!(axial[flat([3, 1, 0])], 1.0);
        assert_eq!(axial.iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn test_shape_mismatch_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "mixed");
        let volumes = vec![
            normalized(dir.path(), 0, &Array3::<f32>::zeros((EDGE, EDGE, EDGE + 1))),
            normalized(dir.path(), 1, &marker_volume(1.0)),
        ];

        let result = execute_stage4(volumes, &paths, &MergeConfig {
            volume_edge: EDGE,
            remove_binary_stores: false,
        })
        .unwrap();

        assert_eq!(result.merged.len(), 1);
        assert_eq!(result.merged[0].index(), CaseIndex(1));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].stage, Stage::Merge);
        assert!(matches!(
            result.failures[0].error,
            CaseError::ShapeMismatch { ref actual, .. } if actual == &vec![4, 4, 5]
        ));
        assert_eq!(result.output.unwrap().layout.slots, 1);
    }

    #[test]
    fn test_nothing_accepted_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RunPaths::new(dir.path(), "empty");
        let volumes = vec![normalized(dir.path(), 0, &Array3::<f32>::zeros((2, 2, 2)))];

        let result = execute_stage4(volumes, &paths, &MergeConfig::default()).unwrap();

        assert!(result.output.is_none());
        assert_eq!(result.failures.len(), 1);
        assert!(!paths.binary_store(View::Axial).exists());
        assert!(!paths.merged_array(View::Axial).exists());
    }
}
