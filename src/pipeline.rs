use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::io::{read_case_list, RunReport};
use crate::models::{CaseFailure, RunPaths, Stage};
use crate::stages::{
    execute_stage1, execute_stage2, execute_stage3, execute_stage4, execute_stage5,
    write_failed_manifest, ExtractConfig, MergeConfig, NormalizeConfig, RegisterConfig,
    RunnerConfig,
};
use crate::tools::{ToolClient, ToolConfig};

/// Everything one run needs
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Text file listing one case volume per line
    pub case_list: PathBuf,
    /// Reference volume for rigid registration
    pub reference: PathBuf,
    /// Defaults to the directory of the first case
    pub output_dir: Option<PathBuf>,
    pub tools: ToolConfig,
    pub runner: RunnerConfig,
    pub extract: ExtractConfig,
    pub normalize: NormalizeConfig,
    pub merge: MergeConfig,
}

impl PipelineConfig {
    pub fn new(case_list: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            case_list: case_list.into(),
            reference: reference.into(),
            ..Default::default()
        }
    }
}

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub paths: RunPaths,
    pub total_cases: usize,
    pub merged_cases: usize,
    pub failed_cases: usize,
    /// Merged `.npy` arrays in sagittal, coronal, axial order
    pub arrays: Vec<PathBuf>,
    pub report: PathBuf,
}

/// Run every stage over the case list
///
/// Configuration problems are reported before any tool runs. Per-case
/// failures drop the case and are listed in the failure manifest; the run
/// itself fails only when no case reaches the merged arrays.
pub async fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    let started_at = Utc::now();
    let started = Instant::now();

    info!("Loading case list from {:?}", config.case_list);
    let list = read_case_list(&config.case_list)?;
    if config.runner.workers == 0 {
        return Err(PipelineError::NoWorkers.into());
    }
    if !config.reference.is_file() {
        return Err(PipelineError::ReferenceNotFound(config.reference.clone()).into());
    }
    list.verify_exists()?;

    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| list.storage_dir());
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    let paths = RunPaths::new(output_dir, list.name.clone());
    let total_cases = list.cases.len();
    info!(
        "Loaded {} cases for run '{}', writing to {:?}",
        total_cases, paths.run_name, paths.output_dir
    );

    let client = ToolClient::new(config.tools.clone());
    debug!(
        "Tools: converter `{}`, extractor `{}`, registrar `{}`",
        client.config().converter.display_name(),
        client.config().extractor.display_name(),
        client.config().registrar.display_name()
    );
    let mut failures: Vec<CaseFailure> = Vec::new();
    let abort = |stage: Stage, failures: &[CaseFailure]| -> Result<PipelineSummary> {
        write_failed_manifest(&paths, failures)?;
        let report = RunReport::new::<()>(&paths.run_name, started_at, Utc::now(), &[], failures);
        report.write_json(&paths.report())?;
        Err(PipelineError::NoCasesRemaining(stage).into())
    };

    // Stage 1: b0 extraction
    info!("Stage 1: Extracting b0 volumes...");
    let stage1 = execute_stage1(&client, &list.cases, &config.extract, &config.runner).await;
    failures.extend(stage1.failures);
    if stage1.succeeded.is_empty() {
        return abort(Stage::Extract, &failures);
    }

    // Stage 2: rigid registration
    info!("Stage 2: Registering to {:?}...", config.reference);
    let register_config = RegisterConfig {
        reference: config.reference.clone(),
    };
    let stage2 = execute_stage2(&client, stage1.succeeded, &register_config, &config.runner).await;
    failures.extend(stage2.failures);
    if stage2.succeeded.is_empty() {
        return abort(Stage::Register, &failures);
    }

    // Stage 3: intensity normalization
    info!("Stage 3: Normalizing intensities...");
    let stage3 = execute_stage3(stage2.succeeded, &config.normalize, &config.runner).await;
    failures.extend(stage3.failures);
    if stage3.succeeded.is_empty() {
        return abort(Stage::Normalize, &failures);
    }

    // Stage 4: merge into view tensors
    info!("Stage 4: Merging {} volumes...", stage3.succeeded.len());
    let stage4 = {
        let paths = paths.clone();
        let merge = config.merge.clone();
        let volumes = stage3.succeeded;
        tokio::task::spawn_blocking(move || execute_stage4(volumes, &paths, &merge))
            .await
            .context("Merge task panicked")??
    };
    failures.extend(stage4.failures);
    let Some(merged_arrays) = stage4.output else {
        return abort(Stage::Merge, &failures);
    };

    // Stage 5: manifests
    info!("Stage 5: Writing manifests...");
    execute_stage5(&paths, &merged_arrays.arrays, &stage4.merged, &failures)?;

    let report = RunReport::new(
        &paths.run_name,
        started_at,
        Utc::now(),
        &stage4.merged,
        &failures,
    );
    report.write_json(&paths.report())?;

    if !failures.is_empty() {
        warn!(
            "{} of {} cases excluded, see {:?}",
            failures.len(),
            total_cases,
            paths.failed_manifest()
        );
    }
    info!(
        "Complete: {} cases merged in {:.1} minutes",
        stage4.merged.len(),
        started.elapsed().as_secs_f64() / 60.0
    );

    Ok(PipelineSummary {
        total_cases,
        merged_cases: stage4.merged.len(),
        failed_cases: failures.len(),
        arrays: merged_arrays.arrays,
        report: paths.report(),
        paths,
    })
}
