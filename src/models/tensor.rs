use std::fmt;

use ndarray::ArrayView3;
use serde::Serialize;

/// Bytes per stored sample (little-endian f32)
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// Default edge length of every merged volume
pub const DEFAULT_VOLUME_EDGE: usize = 256;

/// Anatomical view stored in one merged tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Sagittal,
    Coronal,
    Axial,
}

impl View {
    /// Every view, in store order
    pub const ALL: [View; 3] = [View::Sagittal, View::Coronal, View::Axial];

    /// Axis order applied to the native (x, y, z) volume
    pub fn permutation(self) -> [usize; 3] {
        match self {
            View::Sagittal => [0, 1, 2],
            View::Coronal => [1, 0, 2],
            View::Axial => [2, 1, 0],
        }
    }

    /// Reorient a native volume into this view without copying
    pub fn orient<'a>(self, volume: ArrayView3<'a, f32>) -> ArrayView3<'a, f32> {
        volume.permuted_axes(self.permutation())
    }

    pub fn name(self) -> &'static str {
        match self {
            View::Sagittal => "sagittal",
            View::Coronal => "coronal",
            View::Axial => "axial",
        }
    }

    /// Single-letter tag used in flat store file names
    pub fn store_tag(self) -> char {
        match self {
            View::Sagittal => 's',
            View::Coronal => 'c',
            View::Axial => 'a',
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry of a merged tensor: `slots` cubes of `edge`³ samples stacked on axis 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLayout {
    pub edge: usize,
    pub slots: usize,
}

impl StoreLayout {
    pub fn new(edge: usize, slots: usize) -> Self {
        Self { edge, slots }
    }

    /// Shape every case volume must have
    pub fn volume_shape(&self) -> [usize; 3] {
        [self.edge; 3]
    }

    /// Shape of the whole tensor: (edge·slots, edge, edge)
    pub fn shape(&self) -> [usize; 3] {
        [self.edge * self.slots, self.edge, self.edge]
    }

    /// Samples per case
    pub fn slab_len(&self) -> usize {
        self.edge * self.edge * self.edge
    }

    pub fn slab_bytes(&self) -> usize {
        self.slab_len() * SAMPLE_BYTES
    }

    /// Byte offset of a slot within the store
    pub fn offset(&self, slot: usize) -> usize {
        slot * self.slab_bytes()
    }

    pub fn total_bytes(&self) -> u64 {
        self.slab_bytes() as u64 * self.slots as u64
    }
}
