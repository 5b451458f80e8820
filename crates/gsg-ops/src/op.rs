use std::fmt::Debug;

use crate::fused::OutputOp;
use crate::pass_through::PassThrough;

/// A pure, stateless elementwise function applied at a fixed pipeline point.
///
/// Operators are small `Copy` values so kernels can capture them by value and
/// call them independently for every element.
pub trait ElementwiseOp: Copy + Send + Sync + Debug {
    /// Returns the name of this operator.
    fn name(&self) -> &str;

    /// Apply the operator to one element.
    fn apply(&self, x: f32) -> f32;

    /// Compose with `next`, which runs on this operator's output.
    fn then<N: ElementwiseOp>(self, next: N) -> Then<Self, N> {
        Then {
            first: self,
            second: next,
        }
    }
}

/// Two operators run back to back: `second(first(x))`.
#[derive(Debug, Clone, Copy)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<A: ElementwiseOp, B: ElementwiseOp> ElementwiseOp for Then<A, B> {
    fn name(&self) -> &str {
        "then"
    }

    fn apply(&self, x: f32) -> f32 {
        self.second.apply(self.first.apply(x))
    }
}

/// The five operator slots of `C = out(acc(A·B0)·B1)`.
pub trait ElementwisePipeline: Copy + Send + Sync + Debug {
    /// Applied to every element of A as it is read.
    fn input(&self, x: f32) -> f32;
    /// Applied to every element of B0 as it is read.
    fn weight(&self, x: f32) -> f32;
    /// Applied to the first product's accumulator, before masking and softmax.
    fn acc(&self, x: f32) -> f32;
    /// Applied to every element of B1 as it is read.
    fn second_input(&self, x: f32) -> f32;
    /// Auxiliary tensors the output slot reads.
    const NUM_D: usize;

    /// Applied to the final value before it is stored, with the `NUM_D`
    /// auxiliary values at the same coordinate.
    fn output(&self, x: f32, d: &[f32]) -> f32;
}

/// Concrete operator bundle, one type parameter per slot.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOps<A, B, Acc, B1, C> {
    pub a: A,
    pub b: B,
    pub acc: Acc,
    pub b1: B1,
    pub c: C,
}

impl<A, B, Acc, B1, C> PipelineOps<A, B, Acc, B1, C> {
    pub fn new(a: A, b: B, acc: Acc, b1: B1, c: C) -> Self {
        PipelineOps { a, b, acc, b1, c }
    }
}

impl PipelineOps<PassThrough, PassThrough, PassThrough, PassThrough, PassThrough> {
    /// Every slot is the identity.
    pub fn pass_through() -> Self {
        PipelineOps::new(PassThrough, PassThrough, PassThrough, PassThrough, PassThrough)
    }
}

impl<Acc> PipelineOps<PassThrough, PassThrough, Acc, PassThrough, PassThrough> {
    /// Identity everywhere except the accumulator slot, the usual attention
    /// setup where `acc` carries the `1/sqrt(d)` scale.
    pub fn with_acc(acc: Acc) -> Self {
        PipelineOps::new(PassThrough, PassThrough, acc, PassThrough, PassThrough)
    }
}

impl<A, B, Acc, B1, C> ElementwisePipeline for PipelineOps<A, B, Acc, B1, C>
where
    A: ElementwiseOp,
    B: ElementwiseOp,
    Acc: ElementwiseOp,
    B1: ElementwiseOp,
    C: OutputOp,
{
    const NUM_D: usize = C::NUM_D;

    fn input(&self, x: f32) -> f32 {
        self.a.apply(x)
    }

    fn weight(&self, x: f32) -> f32 {
        self.b.apply(x)
    }

    fn acc(&self, x: f32) -> f32 {
        self.acc.apply(x)
    }

    fn second_input(&self, x: f32) -> f32 {
        self.b1.apply(x)
    }

    fn output(&self, x: f32, d: &[f32]) -> f32 {
        self.c.fuse(x, d)
    }
}
