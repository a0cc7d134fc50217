use std::path::{Path, PathBuf};

use ndarray::Array3;
use thiserror::Error;
use tracing::debug;

use crate::error::CaseError;
use crate::io::{read_volume, write_volume};
use crate::models::{NormalizedVolume, RegisteredVolume, Stage, Tagged};

use super::runner::{run_stage, RunnerConfig, StageOutcome};

/// Numeric failures of intensity normalization
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("volume {0:?} has no samples")]
    EmptyVolume(PathBuf),

    #[error("degenerate {percentile}th percentile intensity {value} in {path:?}")]
    DegeneratePercentile {
        path: PathBuf,
        percentile: f64,
        value: f64,
    },
}

/// Configuration for Stage 3
#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    /// Percentile mapped to intensity 1.0
    pub percentile: f64,
    /// Percentile values at or below this are rejected as degenerate
    pub min_scale: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            percentile: 99.0,
            min_scale: 1e-6,
        }
    }
}

/// Result of Stage 3: one normalized volume per surviving case
pub type Stage3Result = StageOutcome<NormalizedVolume>;

/// Execute Stage 3: percentile intensity normalization
///
/// CPU-bound work runs on the blocking pool, still bounded by the worker count.
pub async fn execute_stage3(
    registered: Vec<Tagged<RegisteredVolume>>,
    config: &NormalizeConfig,
    runner: &RunnerConfig,
) -> Stage3Result {
    let config = config.clone();

    run_stage(Stage::Normalize, runner, registered, move |case, registered| {
        let config = config.clone();
        async move {
            let output = case.names.normalized_volume();
            tokio::task::spawn_blocking(move || -> Result<NormalizedVolume, CaseError> {
                normalize_volume(&registered.warped, &output, &config)?;
                Ok(NormalizedVolume {
                    path: output,
                    registered,
                })
            })
            .await
            .unwrap_or_else(|e| Err(CaseError::WorkerCrashed(e.to_string())))
        }
    })
    .await
}

/// Normalize one volume file into `output`, keeping the input header
///
/// Returns the percentile intensity used as the scale. Nothing is written
/// when the volume is rejected.
pub fn normalize_volume(
    input: &Path,
    output: &Path,
    config: &NormalizeConfig,
) -> Result<f32, CaseError> {
    let mut volume = read_volume(input)?;
    let scale = normalize_array(&mut volume.data, config, input)?;
    debug!("{:?}: {}th percentile {}", input, config.percentile, scale);

    write_volume(output, &volume.data, Some(&volume.header))?;
    Ok(scale)
}

/// Divide every sample by the configured percentile and clamp to [0, 1]
///
/// NaN samples become 0. `source` only labels errors.
pub fn normalize_array(
    data: &mut Array3<f32>,
    config: &NormalizeConfig,
    source: &Path,
) -> Result<f32, NormalizeError> {
    data.mapv_inplace(|v| if v.is_nan() { 0.0 } else { v });

    let mut samples: Vec<f32> = data.iter().copied().collect();
    let value = percentile_in_place(&mut samples, config.percentile)
        .ok_or_else(|| NormalizeError::EmptyVolume(source.to_path_buf()))?;
    if !value.is_finite() || value <= config.min_scale {
        return Err(NormalizeError::DegeneratePercentile {
            path: source.to_path_buf(),
            percentile: config.percentile,
            value,
        });
    }

    let scale = value as f32;
    data.mapv_inplace(|v| (v / scale).clamp(0.0, 1.0));
    Ok(scale)
}

/// Percentile with linear interpolation between the closest ranks
///
/// `q` is in [0, 100]. Reorders `values`. Returns `None` for an empty slice.
fn percentile_in_place(values: &mut [f32], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let rank = q.clamp(0.0, 100.0) / 100.0 * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    let (_, lower_value, above) = values.select_nth_unstable_by(lower, f32::total_cmp);
    let lower_value = f64::from(*lower_value);
    let upper_value = if upper == lower {
        lower_value
    } else {
        // Everything above the selected element is >= it; the next rank is its minimum
        above
            .iter()
            .copied()
            .min_by(f32::total_cmp)
            .map(f64::from)
            .unwrap_or(lower_value)
    };

    Some(lower_value + (upper_value - lower_value) * (rank - lower as f64))
}
