use std::fmt::Debug;

use gsg_ops::{ElementwisePipeline, MAX_D_TENSORS};
use gsg_tensor::{DeviceMemory, DevicePtr, TensorDescriptor};

use crate::config::TileConfig;
use crate::error::Result;
use crate::mask::BoundaryMask;

/// An auxiliary tensor read by the output operator.
#[derive(Debug, Clone, Copy)]
pub struct AuxOperand<'a> {
    pub ptr: DevicePtr,
    /// `[MBlock, MPerBlock, OBlock, OPerBlock]`, same lengths as `c_grid`.
    pub grid: &'a TensorDescriptor,
}

/// What one block hands the tile engine.
///
/// Pointers are already moved to the block's batch. Descriptors address
/// relative to those pointers.
#[derive(Debug, Clone, Copy)]
pub struct TileArgs<'a> {
    pub a: DevicePtr,
    pub b0: DevicePtr,
    pub b1: DevicePtr,
    pub c: DevicePtr,
    /// `[AK0, M, AK1]`
    pub a_grid: &'a TensorDescriptor,
    /// `[BK0, N, BK1]`
    pub b0_grid: &'a TensorDescriptor,
    /// `[B1K0, O, B1K1]`
    pub b1_grid: &'a TensorDescriptor,
    /// `[MBlock, MPerBlock, OBlock, OPerBlock]`
    pub c_grid: &'a TensorDescriptor,
    /// Auxiliary tensors in slot order; the first `P::NUM_D` are present.
    pub ds: [Option<AuxOperand<'a>>; MAX_D_TENSORS],
    pub mask: BoundaryMask,
    pub m_block: usize,
    pub o_block: usize,
}

/// Computes one output tile of `C = out(softmax(mask(acc(A·B0)))·B1, D..)`.
///
/// Contract:
/// - reads at invalid (padding) coordinates yield 0;
/// - stores at invalid coordinates are skipped;
/// - the tile depends on nothing but its own `TileArgs`, so blocks may run
///   in any order.
pub trait TileEngine<C: TileConfig>: Send + Sync + Debug {
    /// Returns the name of this engine (e.g., "cpu").
    fn name(&self) -> &str;

    fn run_tile<const HAS_MAIN_K_LOOP: bool, P: ElementwisePipeline>(
        &self,
        memory: &mut DeviceMemory,
        args: &TileArgs<'_>,
        ops: &P,
    ) -> Result<()>;
}
