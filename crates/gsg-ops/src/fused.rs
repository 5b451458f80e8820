use std::fmt::Debug;

use crate::op::ElementwiseOp;

/// Most auxiliary tensors an output operator may read.
pub const MAX_D_TENSORS: usize = 2;

/// Output operator that may fold auxiliary tensors into the result.
///
/// `D0` is conventionally a bias and `D1` a residual. Every plain
/// [`ElementwiseOp`] is an output operator that reads none.
pub trait OutputOp: Copy + Send + Sync + Debug {
    /// How many auxiliary tensors this operator reads, at most
    /// [`MAX_D_TENSORS`].
    const NUM_D: usize;

    /// Combine `x` with `d`, the `NUM_D` auxiliary values at the same
    /// output coordinate.
    fn fuse(&self, x: f32, d: &[f32]) -> f32;
}

impl<T: ElementwiseOp> OutputOp for T {
    const NUM_D: usize = 0;

    fn fuse(&self, x: f32, _d: &[f32]) -> f32 {
        self.apply(x)
    }
}

/// `relu(x + d0)`: bias then activation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddRelu;

impl OutputOp for AddRelu {
    const NUM_D: usize = 1;

    fn fuse(&self, x: f32, d: &[f32]) -> f32 {
        (x + d[0]).max(0.0)
    }
}

/// `relu(x + d0) + d1`: bias, activation, then residual add.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddReluAdd;

impl OutputOp for AddReluAdd {
    const NUM_D: usize = 2;

    fn fuse(&self, x: f32, d: &[f32]) -> f32 {
        (x + d[0]).max(0.0) + d[1]
    }
}
