use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Total preamble + header length is padded to a multiple of this
const NPY_ALIGNMENT: usize = 64;

/// Build a version 1.0 `.npy` header for a C-ordered array
///
/// `descr` is a numpy dtype string such as `<f4`.
pub fn npy_header(descr: &str, shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape_str
    );

    // magic (6) + version (2) + header length (2) + dict + '\n'
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    dict.push_str(&" ".repeat(pad));
    dict.push('\n');

    let mut header = Vec::with_capacity(unpadded + pad);
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

/// Write little-endian f32 sample bytes as a `.npy` array of the given shape
pub fn write_npy_f32_bytes(path: &Path, shape: &[usize], bytes: &[u8]) -> Result<()> {
    let expected = shape.iter().product::<usize>() * std::mem::size_of::<f32>();
    anyhow::ensure!(
        bytes.len() == expected,
        "Data length mismatch for {:?}: got {} bytes, expected {} for shape {:?}",
        path,
        bytes.len(),
        expected,
        shape
    );

    let file =
        File::create(path).with_context(|| format!("Failed to create file: {:?}", path))?;
    let mut writer = BufWriter::with_capacity(8 * 1024 * 1024, file);
    writer.write_all(&npy_header("<f4", shape))?;
    writer.write_all(bytes)?;
    writer
        .flush()
        .with_context(|| format!("Failed to write array: {:?}", path))?;
    Ok(())
}
