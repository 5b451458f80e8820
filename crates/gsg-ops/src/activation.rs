use crate::op::ElementwiseOp;

/// ReLU activation: max(x, 0).
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl ElementwiseOp for Relu {
    fn name(&self) -> &str {
        "relu"
    }

    fn apply(&self, x: f32) -> f32 {
        x.max(0.0)
    }
}

/// Logistic sigmoid: 1 / (1 + exp(-x)).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sigmoid;

impl ElementwiseOp for Sigmoid {
    fn name(&self) -> &str {
        "sigmoid"
    }

    fn apply(&self, x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }
}

/// SiLU activation: x * sigmoid(x) = x / (1 + exp(-x)).
#[derive(Debug, Clone, Copy, Default)]
pub struct Silu;

impl ElementwiseOp for Silu {
    fn name(&self) -> &str {
        "silu"
    }

    fn apply(&self, x: f32) -> f32 {
        x / (1.0 + (-x).exp())
    }
}
