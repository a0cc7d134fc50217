use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::{Mmap, MmapMut};
use ndarray::ArrayView3;

use crate::models::{StoreLayout, SAMPLE_BYTES};

/// Writable, preallocated flat store of little-endian f32 slabs
///
/// Each slot is addressed by its byte offset, so slabs may be written in any
/// order and an unwritten slot stays zero-filled.
pub struct FlatStoreWriter {
    path: PathBuf,
    layout: StoreLayout,
    map: MmapMut,
}

impl FlatStoreWriter {
    /// Create (or truncate) the store file at its final size and map it
    pub fn create(path: &Path, layout: StoreLayout) -> Result<Self> {
        if layout.total_bytes() == 0 {
            bail!("Refusing to create empty store {:?}", path);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("Failed to create store: {:?}", path))?;
        file.set_len(layout.total_bytes())
            .with_context(|| format!("Failed to allocate store: {:?}", path))?;

        let map = unsafe { MmapMut::map_mut(&file) }
            .with_context(|| format!("Failed to map store: {:?}", path))?;

        Ok(Self {
            path: path.to_path_buf(),
            layout,
            map,
        })
    }

    /// Write one case's oriented volume into `slot`, in row-major order
    pub fn write_slab(&mut self, slot: usize, slab: ArrayView3<'_, f32>) -> Result<()> {
        if slot >= self.layout.slots {
            bail!(
                "Slot {} out of range for store {:?} with {} slots",
                slot,
                self.path,
                self.layout.slots
            );
        }
        if slab.shape() != self.layout.volume_shape() {
            bail!(
                "Slab shape {:?} does not match store {:?} shape {:?}",
                slab.shape(),
                self.path,
                self.layout.volume_shape()
            );
        }

        let start = self.layout.offset(slot);
        let end = start + self.layout.slab_bytes();
        let target = &mut self.map[start..end];
        for (bytes, value) in target.chunks_exact_mut(SAMPLE_BYTES).zip(slab.iter()) {
            bytes.copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Flush all slabs to disk and release the mapping
    pub fn finish(self) -> Result<PathBuf> {
        self.map
            .flush()
            .with_context(|| format!("Failed to flush store: {:?}", self.path))?;
        Ok(self.path)
    }
}

/// Reopen a completed store read-only, checking it has exactly the expected size
pub fn open_store(path: &Path, layout: StoreLayout) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("Failed to open store: {:?}", path))?;
    let actual = file
        .metadata()
        .with_context(|| format!("Failed to stat store: {:?}", path))?
        .len();
    if actual != layout.total_bytes() {
        bail!(
            "Store {:?} holds {} bytes, expected {} for shape {:?}",
            path,
            actual,
            layout.total_bytes(),
            layout.shape()
        );
    }

    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to map store: {:?}", path))?;
    Ok(map)
}
