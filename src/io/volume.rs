use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::volume::ndarray::IntoNdArray;
use nifti::writer::WriterOptions;
use nifti::{NiftiError, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

/// Volume load/save failures
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("failed to read volume {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: NiftiError,
    },

    #[error("failed to write volume {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: NiftiError,
    },

    #[error("volume {path:?} has shape {shape:?}, expected a single 3D volume")]
    NotThreeDimensional { path: PathBuf, shape: Vec<usize> },
}

/// A 3D volume with the header it was read with
#[derive(Debug, Clone)]
pub struct Volume {
    pub header: NiftiHeader,
    /// Samples indexed as `[x, y, z]`, scaling already applied
    pub data: Array3<f32>,
}

/// Load a NIfTI volume (.nii or .nii.gz) as f32 samples
pub fn read_volume(path: &Path) -> Result<Volume, VolumeError> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|source| VolumeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let header = object.header().clone();

    let data: ArrayD<f32> =
        object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|source| VolumeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
    let shape = data.shape().to_vec();
    let data = into_three_dimensional(data).ok_or_else(|| VolumeError::NotThreeDimensional {
        path: path.to_path_buf(),
        shape,
    })?;

    Ok(Volume { header, data })
}

/// Read only the header and report the volume's dimensions
///
/// Trailing singleton dimensions beyond the third are dropped.
pub fn read_shape(path: &Path) -> Result<Vec<usize>, VolumeError> {
    let header = NiftiHeader::from_file(path).map_err(|source| VolumeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rank = (header.dim[0] as usize).min(header.dim.len() - 1);
    let mut shape: Vec<usize> = header.dim[1..=rank].iter().map(|&d| d as usize).collect();
    while shape.len() > 3 && shape.last() == Some(&1) {
        shape.pop();
    }
    Ok(shape)
}

/// Write a volume, reusing `reference` for geometry and orientation
pub fn write_volume(
    path: &Path,
    data: &Array3<f32>,
    reference: Option<&NiftiHeader>,
) -> Result<(), VolumeError> {
    // Samples are written unscaled
    let header = reference.map(|h| NiftiHeader {
        scl_slope: 1.0,
        scl_inter: 0.0,
        ..h.clone()
    });

    let options = WriterOptions::new(path);
    let options = match &header {
        Some(header) => options.reference_header(header),
        None => options,
    };
    options.write_nifti(data).map_err(|source| VolumeError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Collapse a trailing singleton 4th dimension and require exactly three axes
fn into_three_dimensional(data: ArrayD<f32>) -> Option<Array3<f32>> {
    let data = if data.ndim() == 4 && data.shape()[3] == 1 {
        data.index_axis_move(Axis(3), 0)
    } else {
        data
    };
    data.into_dimensionality::<Ix3>().ok()
}
