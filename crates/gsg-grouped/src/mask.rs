/// Masking rule for the first product's `M x N` scores.
///
/// Padded columns (`n >= N`) are always excluded from the softmax. When the
/// causal half is on, columns to the right of the diagonal are excluded too.
/// Padded rows need no masking since they are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryMask {
    raw_n: usize,
    mask_upper_triangle: bool,
}

impl BoundaryMask {
    pub fn new(raw_n: usize, mask_upper_triangle: bool) -> Self {
        BoundaryMask {
            raw_n,
            mask_upper_triangle,
        }
    }

    pub fn raw_n(&self) -> usize {
        self.raw_n
    }

    pub fn is_upper_triangle(&self, m: usize, n: usize) -> bool {
        n > m
    }

    pub fn is_n_out_of_bound(&self, n: usize) -> bool {
        n >= self.raw_n
    }

    pub fn is_masked_element(&self, m: usize, n: usize) -> bool {
        (self.mask_upper_triangle && self.is_upper_triangle(m, n)) || self.is_n_out_of_bound(n)
    }
}
