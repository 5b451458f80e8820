//! Grid descriptor builders.
//!
//! Each builder starts from the naive strided view of one operand and stacks
//! padding and K-splitting stages on top, producing the shapes the tile
//! engine walks:
//!
//! | operand | raw view | tile-facing shape |
//! |---|---|---|
//! | A  | `M x K` | `[AK0, M, AK1]` |
//! | B0 | `N x K` | `[BK0, N, BK1]` |
//! | B1 | `O x N` | `[B1K0, O, B1K1]` |
//! | C  | `M x O` | `[MBlock, MPerBlock, OBlock, OPerBlock]` |

use gsg_tensor::{MatrixLayout, TensorDescriptor, Transform};

use crate::config::TileConfig;
use crate::error::Result;
use crate::problem::{OutputPermutation, ProblemDescriptor};

/// Naive `rows x cols` view of a matrix stored with `layout`.
fn naive_matrix(rows: usize, cols: usize, layout: MatrixLayout, stride: usize) -> Result<TensorDescriptor> {
    let strides = layout.strides(stride);
    Ok(TensorDescriptor::naive(vec![rows, cols], strides.to_vec())?)
}

/// Naive `cols x rows` view of a `rows x cols` matrix stored with `layout`.
fn naive_transposed(rows: usize, cols: usize, layout: MatrixLayout, stride: usize) -> Result<TensorDescriptor> {
    let [row_stride, col_stride] = layout.strides(stride);
    Ok(TensorDescriptor::naive(vec![cols, rows], vec![col_stride, row_stride])?)
}

/// Split the K-like dim 1 of a padded 2D descriptor into `[K0, rows, K1]`.
fn split_k(padded: &TensorDescriptor, k1: usize) -> Result<TensorDescriptor> {
    let rows = padded.length(0);
    let k = padded.length(1);
    let split = padded.transform(
        vec![
            Transform::pass_through(rows),
            Transform::unmerge(vec![k.div_ceil(k1.max(1)), k1]),
        ],
        vec![vec![0], vec![1]],
        vec![vec![1], vec![0, 2]],
    )?;
    Ok(split)
}

/// A as `[AK0, M, AK1]`.
pub fn make_a_grid_descriptor<C: TileConfig>(problem: &ProblemDescriptor) -> Result<TensorDescriptor> {
    let raw = naive_matrix(problem.m, problem.k, C::A_LAYOUT, problem.stride_a)?;
    let padded = C::padder().pad_a(&raw)?;
    split_k(&padded, C::AK1)
}

/// B0 (mathematically `K x N`) as `[BK0, N, BK1]`.
pub fn make_b0_grid_descriptor<C: TileConfig>(problem: &ProblemDescriptor) -> Result<TensorDescriptor> {
    let raw = naive_transposed(problem.k, problem.n, C::B_LAYOUT, problem.stride_b0)?;
    let padded = C::padder().pad_b0(&raw)?;
    split_k(&padded, C::BK1)
}

/// B1 (mathematically `N x O`) as `[B1K0, O, B1K1]`, with N as the split
/// reduction dim.
pub fn make_b1_grid_descriptor<C: TileConfig>(problem: &ProblemDescriptor) -> Result<TensorDescriptor> {
    let raw = naive_transposed(problem.n, problem.o, C::B1_LAYOUT, problem.stride_b1)?;
    let padded = C::padder().pad_b1(&raw)?;
    split_k(&padded, C::B1K1)
}

/// Unpadded `M x O` view of one batch of the output.
pub fn make_c_raw_descriptor(output: &OutputPermutation) -> Result<TensorDescriptor> {
    let num_m = output.num_m();
    let num_o = output.num_o();
    let lengths: Vec<usize> = output.m_lengths().iter().chain(output.o_lengths()).copied().collect();
    let strides: Vec<usize> = output.m_strides().iter().chain(output.o_strides()).copied().collect();
    let naive = TensorDescriptor::naive(lengths, strides)?;
    let merged = naive.transform(
        vec![
            Transform::merge(output.m_lengths().to_vec()),
            Transform::merge(output.o_lengths().to_vec()),
        ],
        vec![(0..num_m).collect(), (num_m..num_m + num_o).collect()],
        vec![vec![0], vec![1]],
    )?;
    Ok(merged)
}

/// Padded `M x O` output view.
pub fn make_c_grid_descriptor<C: TileConfig>(output: &OutputPermutation) -> Result<TensorDescriptor> {
    let raw = make_c_raw_descriptor(output)?;
    C::padder().pad_c(&raw)
}

/// Padded output split into `[MBlock, MPerBlock, OBlock, OPerBlock]`.
pub fn make_c_tile_descriptor<C: TileConfig>(c_grid: &TensorDescriptor) -> Result<TensorDescriptor> {
    let m = c_grid.length(0);
    let o = c_grid.length(1);
    let tiled = c_grid.transform(
        vec![
            Transform::unmerge(vec![m.div_ceil(C::M_PER_BLOCK), C::M_PER_BLOCK]),
            Transform::unmerge(vec![o.div_ceil(C::GEMM1_N_PER_BLOCK), C::GEMM1_N_PER_BLOCK]),
        ],
        vec![vec![0], vec![1]],
        vec![vec![0, 1], vec![2, 3]],
    )?;
    Ok(tiled)
}

/// Output as `[G, M, O]` with each group of dims merged and no padding.
///
/// The offset of `(g, 0, 0)` is the start of batch `g` under any output
/// permutation.
pub fn make_c_batch_descriptor(output: &OutputPermutation) -> Result<TensorDescriptor> {
    let num_g = output.num_g();
    let num_m = output.num_m();
    let rank = output.lengths().len();
    let naive = TensorDescriptor::naive(output.lengths().to_vec(), output.strides().to_vec())?;
    let merged = naive.transform(
        vec![
            Transform::merge(output.g_lengths().to_vec()),
            Transform::merge(output.m_lengths().to_vec()),
            Transform::merge(output.o_lengths().to_vec()),
        ],
        vec![
            (0..num_g).collect(),
            (num_g..num_g + num_m).collect(),
            (num_g + num_m..rank).collect(),
        ],
        vec![vec![0], vec![1], vec![2]],
    )?;
    Ok(merged)
}

/// Maps a per-batch tile index onto `(m_block, o_block)`, row-major over the
/// `MBlock x OBlock` tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockToTileMap {
    m_blocks: usize,
    o_blocks: usize,
}

impl BlockToTileMap {
    pub fn new(m_padded: usize, o_padded: usize, m_tile: usize, o_tile: usize) -> Self {
        BlockToTileMap {
            m_blocks: m_padded.div_ceil(m_tile.max(1)),
            o_blocks: o_padded.div_ceil(o_tile.max(1)),
        }
    }

    pub fn for_config<C: TileConfig>(c_grid: &TensorDescriptor) -> Self {
        Self::new(
            c_grid.length(0),
            c_grid.length(1),
            C::M_PER_BLOCK,
            C::GEMM1_N_PER_BLOCK,
        )
    }

    pub fn m_blocks(&self) -> usize {
        self.m_blocks
    }

    pub fn o_blocks(&self) -> usize {
        self.o_blocks
    }

    pub fn tile_count(&self) -> usize {
        self.m_blocks * self.o_blocks
    }

    /// # Panics
    /// Panics if the map has no tiles.
    pub fn tile_coordinates(&self, tile_index: usize) -> (usize, usize) {
        (tile_index / self.o_blocks, tile_index % self.o_blocks)
    }
}
