use crate::error::{Result, TensorError};

/// Dimension lengths of a densely packed tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }

    /// Row-major strides: `[d0, d1, d2]` packs as `[d1*d2, d2, 1]`.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Packed strides for a memory order other than the logical one.
    ///
    /// `order` lists logical dims from outermost to innermost in memory.
    /// Logical `[B, H, M, O]` stored as `[B, M, H, O]` is `order = [0, 2, 1, 3]`.
    pub fn strides_for_order(&self, order: &[usize]) -> Result<Vec<usize>> {
        let rank = self.dims.len();
        if order.len() != rank {
            return Err(TensorError::RankMismatch {
                expected: rank,
                got: order.len(),
            });
        }
        let mut seen = vec![false; rank];
        for &d in order {
            if d >= rank || seen[d] {
                return Err(TensorError::Other(format!(
                    "memory order {:?} is not a permutation of 0..{}",
                    order, rank
                )));
            }
            seen[d] = true;
        }

        let mut strides = vec![0usize; rank];
        let mut running = 1usize;
        for &d in order.iter().rev() {
            strides[d] = running;
            running *= self.dims[d];
        }
        Ok(strides)
    }
}
