use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("rank mismatch: expected {expected} dimensions, got {got}")]
    RankMismatch { expected: usize, got: usize },
    #[error("index {index:?} out of range for lengths {lengths:?}")]
    IndexOutOfRange {
        index: Vec<usize>,
        lengths: Vec<usize>,
    },
    #[error("invalid transform stage: {0}")]
    InvalidStage(String),
    #[error("transform length mismatch on dimension {dim}: expected {expected}, got {got}")]
    TransformLengthMismatch {
        dim: usize,
        expected: usize,
        got: usize,
    },
    #[error("invalid device pointer: buffer {buffer}")]
    InvalidPointer { buffer: u32 },
    #[error("device access out of bounds: offset {offset} + {len} exceeds buffer of {size} elements")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("pointer offset {offset} does not fit a 32-bit handle offset")]
    HandleOverflow { offset: usize },
    #[error("workspace too small: need {needed} bytes, have {capacity}")]
    WorkspaceTooSmall { needed: usize, capacity: usize },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
