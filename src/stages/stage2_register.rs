use std::path::PathBuf;

use tracing::debug;

use crate::error::CaseError;
use crate::models::{B0Volume, Case, RegisteredVolume, Stage, Tagged};
use crate::tools::ToolClient;

use super::runner::{run_stage, RunnerConfig, StageOutcome};

/// Configuration for Stage 2
#[derive(Debug, Clone)]
pub struct RegisterConfig {
    /// Atlas-space reference volume every case is registered onto
    pub reference: PathBuf,
}

/// Result of Stage 2: registered volume and transform per surviving case
pub type Stage2Result = StageOutcome<RegisteredVolume>;

/// Execute Stage 2: rigid registration to the reference
///
/// Runs the registration tool for every extracted b0 volume and verifies that
/// both the warped volume and the affine transform exist afterwards.
pub async fn execute_stage2(
    client: &ToolClient,
    b0_volumes: Vec<Tagged<B0Volume>>,
    config: &RegisterConfig,
    runner: &RunnerConfig,
) -> Stage2Result {
    let client = client.clone();
    let reference = config.reference.clone();

    run_stage(Stage::Register, runner, b0_volumes, move |case, b0| {
        let client = client.clone();
        let reference = reference.clone();
        async move { register_case(&client, &case, &b0, &reference).await }
    })
    .await
}

/// Register a single case's b0 volume
pub async fn register_case(
    client: &ToolClient,
    case: &Case,
    b0: &B0Volume,
    reference: &std::path::Path,
) -> Result<RegisteredVolume, CaseError> {
    let warped = case.names.warped_volume();
    let transform = case.names.transform_matrix();

    let output = client
        .register_rigid(
            reference,
            &b0.path,
            &case.names.registration_prefix(),
            &[warped.as_path(), transform.as_path()],
        )
        .await?;
    debug!(
        "Case {} registered in {:.1}s",
        case.index,
        output.elapsed.as_secs_f64()
    );

    Ok(RegisteredVolume { warped, transform })
}
