//! `gsg-grouped` - Grouped, batched softmax-gemm scheduling.
//!
//! Computes `C = out(softmax(mask(acc(A·B0)))·B1, D0, D1)` for many independent
//! groups of differing shape in one flat launch:
//! - grid descriptors for every operand, padded to tile multiples
//! - contiguous partition of the launch grid across groups and batches
//! - block-to-group resolution and per-batch addressing
//! - causal and padding masks
//! - validation before launch, and the launch itself
//!
//! Per-tile arithmetic sits behind [`TileEngine`]; [`CpuTileEngine`] is the
//! reference implementation.

pub mod argument;
pub mod config;
pub mod cpu;
pub mod device_op;
pub mod engine;
pub mod error;
pub mod grid;
pub mod invoker;
pub mod mask;
pub mod padder;
pub mod problem;
pub mod resolver;
pub mod validity;

pub use argument::{BatchOffsets, GroupMetadata, GroupPointers, GroupShape, GroupedArgument};
pub use config::{
    BlockOrder, Fp16Tile128x128x32Masked, Fp32Tile64x64x32, GemmSpecialization, StreamConfig,
    TileConfig,
};
pub use cpu::CpuTileEngine;
pub use device_op::{DeviceGroupedGemmSoftmaxGemm, DeviceOp};
pub use engine::{AuxOperand, TileArgs, TileEngine};
pub use error::{GroupedGemmError, Result, UnsupportedReason};
pub use grid::BlockToTileMap;
pub use invoker::Invoker;
pub use mask::BoundaryMask;
pub use padder::{Extents, MatrixPadder, PaddedExtents, TileSizes};
pub use problem::{Operand, OperandLayouts, OutputPermutation, ProblemDescriptor};
pub use resolver::{find_group, resolve_block, BlockAssignment, BlockRange};
pub use validity::{check_buffers, check_support, is_supported, MainLoop};
