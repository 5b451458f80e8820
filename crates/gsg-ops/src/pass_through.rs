use crate::op::ElementwiseOp;

/// Identity operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ElementwiseOp for PassThrough {
    fn name(&self) -> &str {
        "pass_through"
    }

    fn apply(&self, x: f32) -> f32 {
        x
    }
}
