use gsg_tensor::{TensorDescriptor, Transform};

use crate::config::GemmSpecialization;
use crate::error::Result;

/// Tile size per problem extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSizes {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub o: usize,
}

/// The four problem extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extents {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub o: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaddedExtents {
    pub raw: Extents,
    pub padded: Extents,
}

/// Rounds problem extents up to tile multiples.
///
/// Padding only grows the logical iteration space. The strides of the raw
/// data never change, and padded coordinates stay distinguishable through
/// [`TensorDescriptor::is_valid_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixPadder {
    specialization: GemmSpecialization,
    tiles: TileSizes,
}

impl MatrixPadder {
    pub fn new(specialization: GemmSpecialization, tiles: TileSizes) -> Self {
        MatrixPadder {
            specialization,
            tiles,
        }
    }

    pub fn specialization(&self) -> GemmSpecialization {
        self.specialization
    }

    pub fn tiles(&self) -> TileSizes {
        self.tiles
    }

    pub fn padded_extents(&self, raw: Extents) -> PaddedExtents {
        let spec = self.specialization;
        PaddedExtents {
            raw,
            padded: Extents {
                m: pad_to(raw.m, self.tiles.m, spec.pads_m()),
                n: pad_to(raw.n, self.tiles.n, spec.pads_n()),
                k: pad_to(raw.k, self.tiles.k, spec.pads_k()),
                o: pad_to(raw.o, self.tiles.o, spec.pads_o()),
            },
        }
    }

    /// Pad a raw `M x K` descriptor.
    pub fn pad_a(&self, desc: &TensorDescriptor) -> Result<TensorDescriptor> {
        let spec = self.specialization;
        pad_2d(
            desc,
            (self.tiles.m, spec.pads_m()),
            (self.tiles.k, spec.pads_k()),
        )
    }

    /// Pad a raw `N x K` descriptor.
    pub fn pad_b0(&self, desc: &TensorDescriptor) -> Result<TensorDescriptor> {
        let spec = self.specialization;
        pad_2d(
            desc,
            (self.tiles.n, spec.pads_n()),
            (self.tiles.k, spec.pads_k()),
        )
    }

    /// Pad a raw `O x N` descriptor. N is B1's reduction dim and pads with
    /// the first product's N tile.
    pub fn pad_b1(&self, desc: &TensorDescriptor) -> Result<TensorDescriptor> {
        let spec = self.specialization;
        pad_2d(
            desc,
            (self.tiles.o, spec.pads_o()),
            (self.tiles.n, spec.pads_n()),
        )
    }

    /// Pad a raw `M x O` descriptor.
    pub fn pad_c(&self, desc: &TensorDescriptor) -> Result<TensorDescriptor> {
        let spec = self.specialization;
        pad_2d(
            desc,
            (self.tiles.m, spec.pads_m()),
            (self.tiles.o, spec.pads_o()),
        )
    }
}

/// Smallest multiple of `tile` that is `>= raw`, or `raw` when padding is off.
pub fn pad_to(raw: usize, tile: usize, enabled: bool) -> usize {
    if enabled && tile > 0 {
        raw.div_ceil(tile) * tile
    } else {
        raw
    }
}

fn pad_2d(
    desc: &TensorDescriptor,
    (row_tile, pad_rows): (usize, bool),
    (col_tile, pad_cols): (usize, bool),
) -> Result<TensorDescriptor> {
    let rows = desc.length(0);
    let cols = desc.length(1);
    let padded = desc.transform(
        vec![
            Transform::right_pad(rows, pad_to(rows, row_tile, pad_rows) - rows),
            Transform::right_pad(cols, pad_to(cols, col_tile, pad_cols) - cols),
        ],
        vec![vec![0], vec![1]],
        vec![vec![0], vec![1]],
    )?;
    Ok(padded)
}
