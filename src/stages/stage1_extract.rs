use crate::error::CaseError;
use crate::models::{B0Volume, Case, Stage};
use crate::tools::{B0Mode, ToolClient};

use super::runner::{run_stage, tag_cases, RunnerConfig, StageOutcome};

/// Configuration for Stage 1
#[derive(Debug, Clone, Default)]
pub struct ExtractConfig {
    /// Intensity threshold passed to the extraction tool
    pub threshold: Option<f64>,
    /// How multiple b0 acquisitions are combined
    pub mode: B0Mode,
}

/// Result of Stage 1: one b0 volume per surviving case
pub type Stage1Result = StageOutcome<B0Volume>;

/// Execute Stage 1: b0 extraction
///
/// For every case, in parallel:
/// 1. Convert legacy (.nrrd/.nhdr) volumes to compressed NIfTI
/// 2. Run the extraction tool against the companion b-values file
/// 3. Verify the b0 volume was written
pub async fn execute_stage1(
    client: &ToolClient,
    cases: &[Case],
    config: &ExtractConfig,
    runner: &RunnerConfig,
) -> Stage1Result {
    let client = client.clone();
    let config = config.clone();

    run_stage(Stage::Extract, runner, tag_cases(cases), move |case, ()| {
        let client = client.clone();
        let config = config.clone();
        async move { extract_case(&client, &case, &config).await }
    })
    .await
}

/// Extract the b0 volume of a single case
pub async fn extract_case(
    client: &ToolClient,
    case: &Case,
    config: &ExtractConfig,
) -> Result<B0Volume, CaseError> {
    let input = case.archival_volume();
    if case.format.is_legacy() {
        client.convert(&case.path, &input).await?;
    }

    let output = case.names.b0_volume();
    client
        .extract_b0(
            &input,
            &case.names.bvals(),
            &output,
            config.threshold,
            config.mode,
        )
        .await?;

    Ok(B0Volume { path: output })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::CaseIndex;
    use crate::stages::test_support::{fake_tools, write_script};
    use crate::tools::ToolError;

    #[test]
    fn test_extract_config_default() {
        let config = ExtractConfig::default();
        assert!(config.threshold.is_none());
        assert_eq!(config.mode, B0Mode::Average);
    }

    #[tokio::test]
    async fn test_extraction_collects_every_case_regardless_of_finish_order() {
        let dir = tempfile::tempdir().unwrap();
        let tools = fake_tools(dir.path());
        let cases: Vec<Case> = ["slow", "medium", "fast"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = dir.path().join(format!("{name}.nii.gz"));
                std::fs::write(&path, name.as_bytes()).unwrap();
                Case::new(CaseIndex(i), path).unwrap()
            })
            .collect();

        let result = execute_stage1(
            &ToolClient::new(tools),
            &cases,
            &ExtractConfig::default(),
            &RunnerConfig { workers: 3 },
        )
        .await;

        assert_eq!(result.succeeded_count(), 3);
        assert_eq!(result.failed_count(), 0);
        for (i, tagged) in result.succeeded.iter().enumerate() {
            assert_eq!(tagged.index(), CaseIndex(i));
            assert_eq!(tagged.value.path, cases[i].names.b0_volume());
            assert!(tagged.value.path.is_file());
        }
        assert_eq!(
            std::fs::read(dir.path().join("dwib0_fast.nii.gz")).unwrap(),
            b"fast"
        );
    }

    #[tokio::test]
    async fn test_legacy_case_is_converted_first() {
        let dir = tempfile::tempdir().unwrap();
        let tools = fake_tools(dir.path());
        let path = dir.path().join("legacy.nhdr");
        std::fs::write(&path, b"legacy").unwrap();
        let case = Case::new(CaseIndex(0), &path).unwrap();

        let b0 = extract_case(&ToolClient::new(tools), &case, &ExtractConfig::default())
            .await
            .unwrap();

        assert!(dir.path().join("legacy.nii.gz").is_file());
        assert_eq!(std::fs::read(&b0.path).unwrap(), b"legacy");
    }

    #[tokio::test]
    async fn test_output_from_previous_run_does_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = fake_tools(dir.path());
        // Exits 0 without writing anything
        tools.extractor = crate::tools::ToolSpec::new("true");
        let path = dir.path().join("sub.nii.gz");
        std::fs::write(&path, b"volume").unwrap();
        let case = Case::new(CaseIndex(0), &path).unwrap();
        std::fs::write(case.names.b0_volume(), b"stale b0").unwrap();

        let err = extract_case(&ToolClient::new(tools), &case, &ExtractConfig::default())
            .await
            .unwrap_err();

        match err {
            CaseError::Tool(ToolError::MissingOutput { path, .. }) => {
                assert_eq!(path, case.names.b0_volume());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!case.names.b0_volume().exists());
    }

    #[tokio::test]
    async fn test_tool_failure_drops_only_that_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut tools = fake_tools(dir.path());
        tools.extractor = write_script(
            dir.path(),
            "failing_bse.sh",
            r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
case "$in" in
  *broken*) echo "no b0 found" >&2; exit 1 ;;
esac
cp "$in" "$out"
"#,
        );
        let cases: Vec<Case> = ["good", "broken"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let path = dir.path().join(format!("{name}.nii"));
                std::fs::write(&path, b"x").unwrap();
                Case::new(CaseIndex(i), path).unwrap()
            })
            .collect();

        let result = execute_stage1(
            &ToolClient::new(tools),
            &cases,
            &ExtractConfig::default(),
            &RunnerConfig::default(),
        )
        .await;

        assert_eq!(result.succeeded_count(), 1);
        assert_eq!(result.succeeded[0].index(), CaseIndex(0));
        let failure = &result.failures[0];
        assert_eq!(failure.case.index, CaseIndex(1));
        assert_eq!(failure.stage, Stage::Extract);
        match &failure.error {
            CaseError::Tool(ToolError::Failed { output_tail, .. }) => {
                assert_eq!(output_tail, "no b0 found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
