use gsg_tensor::{AcceleratorGeneration, TensorError};
use thiserror::Error;

use crate::problem::Operand;

/// Why an argument cannot run on a given device and tile configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    #[error("device generation {0} is not supported by this tile configuration")]
    Generation(AcceleratorGeneration),
    #[error("group {group}: output {dim} is {output} but the operands give {operand}")]
    ShapeMismatch {
        group: usize,
        dim: &'static str,
        output: usize,
        operand: usize,
    },
    #[error("group {group}: output batch lengths multiply to {output}, expected batch count {batch}")]
    BatchMismatch {
        group: usize,
        output: usize,
        batch: usize,
    },
    #[error("group {group}: main K loop is {got} but group 0 has {expected}")]
    MixedMainLoop {
        group: usize,
        expected: bool,
        got: bool,
    },
    #[error("group {group}: {operand} fastest extent {extent} is not a multiple of vector width {vector}")]
    VectorWidth {
        group: usize,
        operand: Operand,
        extent: usize,
        vector: usize,
    },
    #[error("group {group}: {operand} lengths {got:?} differ from output lengths {expected:?}")]
    AuxShapeMismatch {
        group: usize,
        operand: Operand,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("group {group}: output fastest stride is {stride}, must be 1")]
    OutputStride { group: usize, stride: usize },
    #[error("group {group}: padded {dim} = {padded} is not a multiple of tile {tile}")]
    TileDivisibility {
        group: usize,
        dim: &'static str,
        padded: usize,
        tile: usize,
    },
}

#[derive(Error, Debug)]
pub enum GroupedGemmError {
    #[error("group count mismatch: {pointers} pointer sets but {problems} problem descriptors")]
    GroupCountMismatch { pointers: usize, problems: usize },
    #[error("invalid problem: {0}")]
    InvalidProblem(String),
    #[error("group {group}: {operand} buffer holds {available} elements, {required} required")]
    BufferTooSmall {
        group: usize,
        operand: Operand,
        required: usize,
        available: usize,
    },
    #[error("unsupported argument: {0}")]
    Unsupported(#[from] UnsupportedReason),
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),
    #[error("no workspace attached, {needed} bytes required")]
    WorkspaceNotSet { needed: usize },
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, GroupedGemmError>;
