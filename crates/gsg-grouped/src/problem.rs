use std::fmt;

use gsg_ops::MAX_D_TENSORS;
use gsg_tensor::{MatrixLayout, Shape};

use crate::config::TileConfig;
use crate::error::{GroupedGemmError, Result};

/// One of the operands of `C = out(softmax(A·B0)·B1, D0, D1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    A,
    B0,
    B1,
    C,
    /// First auxiliary tensor read by the output operator, usually a bias.
    D0,
    /// Second auxiliary tensor, usually a residual.
    D1,
}

impl Operand {
    /// Auxiliary operands by slot.
    pub const AUX: [Operand; MAX_D_TENSORS] = [Operand::D0, Operand::D1];
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operand::A => "A",
            Operand::B0 => "B0",
            Operand::B1 => "B1",
            Operand::C => "C",
            Operand::D0 => "D0",
            Operand::D1 => "D1",
        };
        f.write_str(name)
    }
}

/// Memory layouts of the three input operands.
///
/// Layouts refer to the mathematical matrices: A is M x K, B0 is K x N and
/// B1 is N x O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandLayouts {
    pub a: MatrixLayout,
    pub b0: MatrixLayout,
    pub b1: MatrixLayout,
}

impl OperandLayouts {
    /// The layouts a tile configuration is compiled for.
    pub fn of<C: TileConfig>() -> Self {
        OperandLayouts {
            a: C::A_LAYOUT,
            b0: C::B_LAYOUT,
            b1: C::B1_LAYOUT,
        }
    }
}

/// Lengths and strides of the output, in logical order `[G.., M.., O..]`.
///
/// The G dims enumerate batches, the M dims merge into the output rows and
/// the O dims merge into the output columns. Strides are free, so the output
/// can land in any permuted memory order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPermutation {
    lengths: Vec<usize>,
    strides: Vec<usize>,
    num_g: usize,
    num_m: usize,
    num_o: usize,
}

impl OutputPermutation {
    pub fn new(
        lengths: Vec<usize>,
        strides: Vec<usize>,
        num_g: usize,
        num_m: usize,
        num_o: usize,
    ) -> Result<Self> {
        let rank = num_g + num_m + num_o;
        if lengths.len() != rank || strides.len() != rank {
            return Err(GroupedGemmError::InvalidProblem(format!(
                "output permutation has {} lengths and {} strides for {} G + {} M + {} O dims",
                lengths.len(),
                strides.len(),
                num_g,
                num_m,
                num_o
            )));
        }
        if num_g == 0 || num_m == 0 || num_o == 0 {
            return Err(GroupedGemmError::InvalidProblem(format!(
                "output permutation needs at least one G, M and O dim, got {}/{}/{}",
                num_g, num_m, num_o
            )));
        }
        Ok(OutputPermutation {
            lengths,
            strides,
            num_g,
            num_m,
            num_o,
        })
    }

    /// Row-major `[G.., M.., O..]`.
    pub fn packed(g: &[usize], m: &[usize], o: &[usize]) -> Result<Self> {
        let lengths: Vec<usize> = g.iter().chain(m).chain(o).copied().collect();
        let strides = Shape::new(lengths.clone()).strides();
        Self::new(lengths, strides, g.len(), m.len(), o.len())
    }

    /// Packed strides for a memory order other than the logical one.
    ///
    /// `order` lists logical dims from outermost to innermost in memory. An
    /// attention output stored as `[batch, M, head, O]` but addressed as
    /// `[batch, head, M, O]` uses `order = [0, 2, 1, 3]`.
    pub fn with_memory_order(g: &[usize], m: &[usize], o: &[usize], order: &[usize]) -> Result<Self> {
        let lengths: Vec<usize> = g.iter().chain(m).chain(o).copied().collect();
        let strides = Shape::new(lengths.clone()).strides_for_order(order)?;
        Self::new(lengths, strides, g.len(), m.len(), o.len())
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn num_g(&self) -> usize {
        self.num_g
    }

    pub fn num_m(&self) -> usize {
        self.num_m
    }

    pub fn num_o(&self) -> usize {
        self.num_o
    }

    pub fn g_lengths(&self) -> &[usize] {
        &self.lengths[..self.num_g]
    }

    pub fn g_strides(&self) -> &[usize] {
        &self.strides[..self.num_g]
    }

    pub fn m_lengths(&self) -> &[usize] {
        &self.lengths[self.num_g..self.num_g + self.num_m]
    }

    pub fn m_strides(&self) -> &[usize] {
        &self.strides[self.num_g..self.num_g + self.num_m]
    }

    pub fn o_lengths(&self) -> &[usize] {
        &self.lengths[self.num_g + self.num_m..]
    }

    pub fn o_strides(&self) -> &[usize] {
        &self.strides[self.num_g + self.num_m..]
    }

    /// Number of batches the G dims enumerate.
    pub fn batch_count(&self) -> usize {
        self.g_lengths().iter().product()
    }

    /// Output rows (product of the M dims).
    pub fn m(&self) -> usize {
        self.m_lengths().iter().product()
    }

    /// Output columns (product of the O dims).
    pub fn o(&self) -> usize {
        self.o_lengths().iter().product()
    }

    /// Length of the last logical dim.
    pub fn lowest_length(&self) -> usize {
        self.lengths.last().copied().unwrap_or(0)
    }

    /// Stride of the last logical dim.
    pub fn lowest_stride(&self) -> usize {
        self.strides.last().copied().unwrap_or(0)
    }

    /// Elements spanned by the output in memory.
    pub fn element_space_size(&self) -> usize {
        if self.lengths.iter().any(|&l| l == 0) {
            return 0;
        }
        1 + self
            .lengths
            .iter()
            .zip(&self.strides)
            .map(|(&l, &s)| (l - 1) * s)
            .sum::<usize>()
    }
}

/// Shape and strides of one group's problem.
///
/// Leading strides are the distance between consecutive rows (row-major) or
/// columns (column-major) of each input matrix. Batch strides are the
/// distance between consecutive batches.
///
/// `ds` describes the auxiliary tensors the output operator reads. Each uses
/// the output's logical `[G.., M.., O..]` lengths with its own strides; a zero
/// stride broadcasts along that dim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemDescriptor {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub o: usize,
    pub batch_count: usize,
    pub stride_a: usize,
    pub stride_b0: usize,
    pub stride_b1: usize,
    pub batch_stride_a: usize,
    pub batch_stride_b0: usize,
    pub batch_stride_b1: usize,
    pub output: OutputPermutation,
    pub ds: [Option<OutputPermutation>; MAX_D_TENSORS],
}

impl ProblemDescriptor {
    /// A fully contiguous problem: densely packed inputs, batches back to
    /// back, and a row-major `[batch, M, O]` output.
    pub fn packed(
        m: usize,
        n: usize,
        k: usize,
        o: usize,
        batch_count: usize,
        layouts: OperandLayouts,
    ) -> Result<Self> {
        let output = OutputPermutation::packed(&[batch_count], &[m], &[o])?;
        Ok(ProblemDescriptor {
            m,
            n,
            k,
            o,
            batch_count,
            stride_a: layouts.a.packed_stride(m, k),
            stride_b0: layouts.b0.packed_stride(k, n),
            stride_b1: layouts.b1.packed_stride(n, o),
            batch_stride_a: m * k,
            batch_stride_b0: k * n,
            batch_stride_b1: n * o,
            output,
            ds: Default::default(),
        })
    }

    /// Replace the output permutation.
    pub fn with_output(mut self, output: OutputPermutation) -> Self {
        self.output = output;
        self
    }

    /// Attach the first auxiliary tensor.
    pub fn with_d0(mut self, d0: OutputPermutation) -> Self {
        self.ds[0] = Some(d0);
        self
    }

    /// Attach the second auxiliary tensor.
    pub fn with_d1(mut self, d1: OutputPermutation) -> Self {
        self.ds[1] = Some(d1);
        self
    }

    /// Elements the operand's buffer must hold for every batch.
    pub fn required_elements(&self, operand: Operand, layouts: OperandLayouts) -> usize {
        let span = |layout: MatrixLayout, rows: usize, cols: usize, stride: usize, batch: usize| {
            if self.batch_count == 0 || rows == 0 || cols == 0 {
                return 0;
            }
            let [rs, cs] = layout.strides(stride);
            (self.batch_count - 1) * batch + (rows - 1) * rs + (cols - 1) * cs + 1
        };
        match operand {
            Operand::A => span(layouts.a, self.m, self.k, self.stride_a, self.batch_stride_a),
            Operand::B0 => span(layouts.b0, self.k, self.n, self.stride_b0, self.batch_stride_b0),
            Operand::B1 => span(layouts.b1, self.n, self.o, self.stride_b1, self.batch_stride_b1),
            Operand::C => self.output.element_space_size(),
            Operand::D0 => self.ds[0].as_ref().map_or(0, OutputPermutation::element_space_size),
            Operand::D1 => self.ds[1].as_ref().map_or(0, OutputPermutation::element_space_size),
        }
    }
}
