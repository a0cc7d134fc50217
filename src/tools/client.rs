use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use tracing::info;

use super::command::{clear_outputs, ensure_outputs, run_tool, ToolError, ToolOutput, ToolSpec};

pub const CONVERTER_ENV: &str = "DWIPREP_CONVERTER";
pub const EXTRACTOR_ENV: &str = "DWIPREP_EXTRACTOR";
pub const REGISTRAR_ENV: &str = "DWIPREP_REGISTRAR";

/// How the extraction tool combines multiple b0 acquisitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum B0Mode {
    /// Average all b0 volumes
    #[default]
    Average,
    /// Keep only the first b0 volume
    First,
    /// Keep every b0 volume
    All,
}

impl B0Mode {
    fn flag(self) -> Option<&'static str> {
        match self {
            B0Mode::Average => Some("--avg"),
            B0Mode::First => None,
            B0Mode::All => Some("--all"),
        }
    }
}

/// Configuration for the external collaborators
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Legacy volume → compressed NIfTI converter
    pub converter: ToolSpec,
    /// b0 extraction tool
    pub extractor: ToolSpec,
    /// Rigid registration tool
    pub registrar: ToolSpec,
    /// Upper bound on any single invocation; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            converter: ToolSpec::new("nifti_write.py"),
            extractor: ToolSpec::new("bse.py"),
            registrar: ToolSpec::new("antsRegistrationSyNQuick.sh"),
            timeout: None,
        }
    }
}

impl ToolConfig {
    /// Defaults, with program overrides taken from the environment
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let lookup = |key: &str| std::env::var(key).ok().and_then(|v| ToolSpec::parse(&v));

        if let Some(spec) = lookup(CONVERTER_ENV) {
            config.converter = spec;
        }
        if let Some(spec) = lookup(EXTRACTOR_ENV) {
            config.extractor = spec;
        }
        if let Some(spec) = lookup(REGISTRAR_ENV) {
            config.registrar = spec;
        }
        config
    }
}

/// Client for the conversion, extraction and registration tools
#[derive(Debug, Clone)]
pub struct ToolClient {
    config: ToolConfig,
}

impl ToolClient {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Convert a legacy volume into a compressed NIfTI at `output`
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<ToolOutput, ToolError> {
        info!("Converting {:?} to {:?}", input, output);
        let spec = &self.config.converter;
        clear_outputs(&[output])?;
        let result = run_tool(spec, &conversion_args(input, output), self.config.timeout).await?;
        ensure_outputs(spec, &[output])?;
        Ok(result)
    }

    /// Extract the b0 volume of `input` into `output`
    pub async fn extract_b0(
        &self,
        input: &Path,
        bvals: &Path,
        output: &Path,
        threshold: Option<f64>,
        mode: B0Mode,
    ) -> Result<ToolOutput, ToolError> {
        info!("Extracting b0 from {:?}", input);
        let spec = &self.config.extractor;
        let args = extraction_args(input, bvals, output, threshold, mode);
        clear_outputs(&[output])?;
        let result = run_tool(spec, &args, self.config.timeout).await?;
        ensure_outputs(spec, &[output])?;
        Ok(result)
    }

    /// Rigidly register `moving` onto `reference`
    ///
    /// The tool derives its output names from `prefix`; callers pass the
    /// expected warped volume and transform so both can be verified.
    pub async fn register_rigid(
        &self,
        reference: &Path,
        moving: &Path,
        prefix: &Path,
        expected_outputs: &[&Path],
    ) -> Result<ToolOutput, ToolError> {
        info!("Registering {:?}", moving);
        let spec = &self.config.registrar;
        let args = registration_args(reference, moving, prefix);
        clear_outputs(expected_outputs)?;
        let result = run_tool(spec, &args, self.config.timeout).await?;
        ensure_outputs(spec, expected_outputs)?;
        Ok(result)
    }
}

/// `-i <input> -o <output>`
pub fn conversion_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-o".into(),
        output.into(),
    ]
}

/// `-i <input> --bvals <bvals> -o <output> [-t <threshold>] [--avg|--all]`
pub fn extraction_args(
    input: &Path,
    bvals: &Path,
    output: &Path,
    threshold: Option<f64>,
    mode: B0Mode,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        input.into(),
        "--bvals".into(),
        bvals.into(),
        "-o".into(),
        output.into(),
    ];
    if let Some(threshold) = threshold {
        args.push("-t".into());
        args.push(threshold.to_string().into());
    }
    if let Some(flag) = mode.flag() {
        args.push(flag.into());
    }
    args
}

/// 3D, rigid-only quick registration: `-d 3 -f <ref> -m <moving> -t r -o <prefix>`
pub fn registration_args(reference: &Path, moving: &Path, prefix: &Path) -> Vec<OsString> {
    vec![
        "-d".into(),
        "3".into(),
        "-f".into(),
        reference.into(),
        "-m".into(),
        moving.into(),
        "-t".into(),
        "r".into(),
        "-o".into(),
        prefix.into(),
    ]
}
