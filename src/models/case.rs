use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PipelineError;

/// Tag the registration tool inserts into its warped output name
pub const WARPED_TAG: &str = "-Warped";

/// Prefix the extraction step puts in front of every b0 volume name
pub const B0_PREFIX: &str = "dwib0_";

/// Position of a case in the original case list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CaseIndex(pub usize);

impl fmt::Display for CaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input volume formats accepted in a case list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeFormat {
    /// Legacy single-file volume (.nrrd)
    Nrrd,
    /// Legacy detached-header volume (.nhdr)
    Nhdr,
    /// Archival volume (.nii)
    Nifti,
    /// Compressed archival volume (.nii.gz)
    NiftiGz,
}

impl VolumeFormat {
    // `.nii.gz` must be tried before `.nii`
    const ALL: [VolumeFormat; 4] = [
        VolumeFormat::NiftiGz,
        VolumeFormat::Nifti,
        VolumeFormat::Nrrd,
        VolumeFormat::Nhdr,
    ];

    /// File name suffix, including the leading dot
    pub fn suffix(self) -> &'static str {
        match self {
            VolumeFormat::Nrrd => ".nrrd",
            VolumeFormat::Nhdr => ".nhdr",
            VolumeFormat::Nifti => ".nii",
            VolumeFormat::NiftiGz => ".nii.gz",
        }
    }

    /// Detect the format from the file name suffix
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|format| name.len() > format.suffix().len() && name.ends_with(format.suffix()))
    }

    /// Whether the volume must go through the conversion tool first
    pub fn is_legacy(self) -> bool {
        matches!(self, VolumeFormat::Nrrd | VolumeFormat::Nhdr)
    }
}

impl fmt::Display for VolumeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix().trim_start_matches('.'))
    }
}

/// Naming record for every file a case produces on its way through the pipeline
///
/// All artifacts live next to the source volume and are derived from its stem
/// (file name without the format suffix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseNames {
    /// Directory holding the source volume and all derived files
    pub directory: PathBuf,
    /// Source file name without its format suffix
    pub stem: String,
}

impl CaseNames {
    /// Build the naming record for a source path of a known format
    pub fn from_path(path: &Path, format: VolumeFormat) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(format.suffix())?;
        if stem.is_empty() {
            return None;
        }
        Some(Self {
            directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            stem: stem.to_string(),
        })
    }

    fn sibling(&self, name: String) -> PathBuf {
        self.directory.join(name)
    }

    /// Compressed archival volume written by the conversion tool
    pub fn converted_volume(&self) -> PathBuf {
        self.sibling(format!("{}.nii.gz", self.stem))
    }

    /// Companion b-values file
    pub fn bvals(&self) -> PathBuf {
        self.sibling(format!("{}.bval", self.stem))
    }

    /// Extracted b0 volume
    pub fn b0_volume(&self) -> PathBuf {
        self.sibling(format!("{}{}.nii.gz", B0_PREFIX, self.stem))
    }

    /// Output prefix handed to the registration tool
    pub fn registration_prefix(&self) -> PathBuf {
        self.sibling(format!("{}{}-", B0_PREFIX, self.stem))
    }

    /// Registered volume written by the registration tool
    pub fn warped_volume(&self) -> PathBuf {
        self.sibling(format!("{}{}{}.nii.gz", B0_PREFIX, self.stem, WARPED_TAG))
    }

    /// Affine transform written by the registration tool
    pub fn transform_matrix(&self) -> PathBuf {
        self.sibling(format!("{}{}-0GenericAffine.mat", B0_PREFIX, self.stem))
    }

    /// Intensity-normalized registered volume
    pub fn normalized_volume(&self) -> PathBuf {
        self.sibling(format!(
            "{}{}{}-normalized.nii.gz",
            B0_PREFIX, self.stem, WARPED_TAG
        ))
    }
}

/// One subject's input volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    /// Position in the case list
    pub index: CaseIndex,
    /// Source volume path as given in the case list
    pub path: PathBuf,
    /// Detected input format
    pub format: VolumeFormat,
    /// Derived artifact names
    pub names: CaseNames,
}

impl Case {
    /// Create a case, rejecting unrecognized formats
    pub fn new(index: CaseIndex, path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        let format =
            VolumeFormat::detect(&path).ok_or_else(|| PipelineError::UnknownFormat(path.clone()))?;
        let names = CaseNames::from_path(&path, format)
            .ok_or_else(|| PipelineError::UnknownFormat(path.clone()))?;

        Ok(Self {
            index,
            path,
            format,
            names,
        })
    }

    /// Volume the extraction tool reads: the converted file for legacy formats
    pub fn archival_volume(&self) -> PathBuf {
        if self.format.is_legacy() {
            self.names.converted_volume()
        } else {
            self.path.clone()
        }
    }
}
