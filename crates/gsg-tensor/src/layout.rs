use std::fmt;

/// Memory order of a 2D operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixLayout {
    /// Rows are contiguous: element (r, c) lives at `r * stride + c`.
    RowMajor,
    /// Columns are contiguous: element (r, c) lives at `c * stride + r`.
    ColumnMajor,
}

impl MatrixLayout {
    /// Strides of a `rows x cols` view with leading dimension `stride`.
    pub fn strides(&self, stride: usize) -> [usize; 2] {
        match self {
            MatrixLayout::RowMajor => [stride, 1],
            MatrixLayout::ColumnMajor => [1, stride],
        }
    }

    /// Leading dimension of a densely packed `rows x cols` matrix.
    pub fn packed_stride(&self, rows: usize, cols: usize) -> usize {
        match self {
            MatrixLayout::RowMajor => cols,
            MatrixLayout::ColumnMajor => rows,
        }
    }

    /// Extent of the fastest-varying dimension of a `rows x cols` matrix.
    pub fn lowest_extent(&self, rows: usize, cols: usize) -> usize {
        match self {
            MatrixLayout::RowMajor => cols,
            MatrixLayout::ColumnMajor => rows,
        }
    }
}

impl fmt::Display for MatrixLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixLayout::RowMajor => write!(f, "row"),
            MatrixLayout::ColumnMajor => write!(f, "col"),
        }
    }
}
