use crate::op::ElementwiseOp;

/// Multiplies every element by a constant.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    scale: f32,
}

impl Scale {
    /// Create a new scale operator with the given factor.
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    /// The `1/sqrt(head_dim)` scale applied to attention scores.
    pub fn attention(head_dim: usize) -> Self {
        Self::new(1.0 / (head_dim.max(1) as f32).sqrt())
    }

    pub fn factor(&self) -> f32 {
        self.scale
    }
}

impl ElementwiseOp for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn apply(&self, x: f32) -> f32 {
        x * self.scale
    }
}
