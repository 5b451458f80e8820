#![allow(dead_code)]

use gsg_grouped::{
    GroupPointers, GroupedArgument, GemmSpecialization, Operand, OperandLayouts, OutputPermutation,
    ProblemDescriptor, TileConfig,
};
use gsg_ops::ElementwisePipeline;
use gsg_tensor::{AcceleratorGeneration, DType, Device, DeviceWorkspace, MatrixLayout};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// fp32 twin of the fp16 attention config: causal mask, 64x64 tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fp32Masked;

impl TileConfig for Fp32Masked {
    const BLOCK_SIZE: usize = 256;
    const M_PER_BLOCK: usize = 64;
    const N_PER_BLOCK: usize = 64;
    const K_PER_BLOCK: usize = 32;
    const GEMM1_N_PER_BLOCK: usize = 32;
    const GEMM1_K_PER_BLOCK: usize = 32;
    const AK1: usize = 4;
    const BK1: usize = 4;
    const B1K1: usize = 2;
    const A_SCALAR_PER_VECTOR: usize = 4;
    const B_SCALAR_PER_VECTOR: usize = 4;
    const B1_SCALAR_PER_VECTOR: usize = 4;
    const C_SCALAR_PER_VECTOR: usize = 4;
    const A_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const B_LAYOUT: MatrixLayout = MatrixLayout::ColumnMajor;
    const B1_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const SPECIALIZATION: GemmSpecialization = GemmSpecialization::MNKOPadding;
    const MASK_OUT_UPPER_TRIANGLE: bool = true;
    const DATA_TYPE: DType = DType::F32;
}

/// Exact-size config with no padding at all, every layout row-major.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fp32Exact;

impl TileConfig for Fp32Exact {
    const BLOCK_SIZE: usize = 128;
    const M_PER_BLOCK: usize = 32;
    const N_PER_BLOCK: usize = 32;
    const K_PER_BLOCK: usize = 16;
    const GEMM1_N_PER_BLOCK: usize = 32;
    const GEMM1_K_PER_BLOCK: usize = 16;
    const AK1: usize = 4;
    const BK1: usize = 4;
    const B1K1: usize = 4;
    const A_SCALAR_PER_VECTOR: usize = 4;
    const B_SCALAR_PER_VECTOR: usize = 4;
    const B1_SCALAR_PER_VECTOR: usize = 4;
    const C_SCALAR_PER_VECTOR: usize = 4;
    const A_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const B_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const B1_LAYOUT: MatrixLayout = MatrixLayout::RowMajor;
    const SPECIALIZATION: GemmSpecialization = GemmSpecialization::Default;
    const MASK_OUT_UPPER_TRIANGLE: bool = false;
    const DATA_TYPE: DType = DType::F32;
}

pub fn device() -> Device {
    Device::new(AcceleratorGeneration::Gfx90a)
}

/// One group allocated on the device, with the host copies of its inputs as
/// the device stores them.
pub struct HostGroup {
    pub problem: ProblemDescriptor,
    pub pointers: GroupPointers,
    pub a: Vec<f32>,
    pub b0: Vec<f32>,
    pub b1: Vec<f32>,
    /// Auxiliary tensors by slot, empty where the problem has none.
    pub ds: Vec<Vec<f32>>,
    pub c_len: usize,
}

/// Allocate and fill the operands of every problem with seeded random data.
pub fn upload_groups<C: TileConfig>(device: &mut Device, problems: &[ProblemDescriptor], seed: u64) -> Vec<HostGroup> {
    let layouts = OperandLayouts::of::<C>();
    let mut rng = StdRng::seed_from_u64(seed);
    let memory = device.memory_mut();
    problems
        .iter()
        .map(|problem| {
            let mut operand = |op: Operand| {
                let len = problem.required_elements(op, layouts).max(1);
                let ptr = memory.alloc(C::DATA_TYPE, len);
                if op != Operand::C {
                    let data: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
                    memory.write(ptr, &data).unwrap();
                }
                (ptr, memory.read(ptr, len).unwrap())
            };
            let (a_ptr, a) = operand(Operand::A);
            let (b0_ptr, b0) = operand(Operand::B0);
            let (b1_ptr, b1) = operand(Operand::B1);
            let (c_ptr, c) = operand(Operand::C);
            let mut pointers = GroupPointers::new(a_ptr, b0_ptr, b1_ptr, c_ptr);
            let mut ds = Vec::new();
            for (slot, aux) in Operand::AUX.into_iter().enumerate() {
                if problem.ds[slot].is_none() {
                    ds.push(Vec::new());
                    continue;
                }
                let (ptr, data) = operand(aux);
                pointers.ds[slot] = Some(ptr);
                ds.push(data);
            }
            HostGroup {
                problem: problem.clone(),
                pointers,
                a,
                b0,
                b1,
                ds,
                c_len: c.len(),
            }
        })
        .collect()
}

pub fn pointers(groups: &[HostGroup]) -> Vec<GroupPointers> {
    groups.iter().map(|g| g.pointers).collect()
}

pub fn problems(groups: &[HostGroup]) -> Vec<ProblemDescriptor> {
    groups.iter().map(|g| g.problem.clone()).collect()
}

pub fn attach_workspace<C: TileConfig, P: ElementwisePipeline>(arg: &mut GroupedArgument<C, P>) {
    let size = arg.workspace_size();
    arg.set_workspace(DeviceWorkspace::with_capacity_bytes(size));
}

fn unravel(mut flat: usize, lengths: &[usize]) -> Vec<usize> {
    let mut index = vec![0; lengths.len()];
    for i in (0..lengths.len()).rev() {
        index[i] = flat % lengths[i];
        flat /= lengths[i];
    }
    index
}

fn dot(index: &[usize], strides: &[usize]) -> usize {
    index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// Offset of output coordinate `(batch, m, o)` under `perm`.
fn output_offset(perm: &OutputPermutation, batch: usize, m: usize, o: usize) -> usize {
    dot(&unravel(batch, perm.g_lengths()), perm.g_strides())
        + dot(&unravel(m, perm.m_lengths()), perm.m_strides())
        + dot(&unravel(o, perm.o_lengths()), perm.o_strides())
}

fn at(layout: MatrixLayout, stride: usize, row: usize, col: usize) -> usize {
    let [rs, cs] = layout.strides(stride);
    row * rs + col * cs
}

/// Naive per-problem softmax-gemm with the output operator folded in, written straight into a host image of the
/// output buffer.
pub fn reference<C: TileConfig, P: ElementwisePipeline>(group: &HostGroup, ops: &P) -> Vec<f32> {
    let p = &group.problem;
    let layouts = OperandLayouts::of::<C>();
    let out = &p.output;
    let mut c = vec![0.0f32; group.c_len];

    for batch in 0..p.batch_count {
        let a_base = batch * p.batch_stride_a;
        let b0_base = batch * p.batch_stride_b0;
        let b1_base = batch * p.batch_stride_b1;

        for m in 0..p.m {
            let mut scores = vec![f32::NEG_INFINITY; p.n];
            for (n, score) in scores.iter_mut().enumerate() {
                if C::MASK_OUT_UPPER_TRIANGLE && n > m {
                    continue;
                }
                let mut acc = 0.0f32;
                for k in 0..p.k {
                    let a = ops.input(group.a[a_base + at(layouts.a, p.stride_a, m, k)]);
                    let b = ops.weight(group.b0[b0_base + at(layouts.b0, p.stride_b0, k, n)]);
                    acc += a * b;
                }
                *score = ops.acc(acc);
            }

            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let probs: Vec<f32> = if max == f32::NEG_INFINITY {
                vec![0.0; p.n]
            } else {
                let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
                let sum: f32 = exps.iter().sum();
                exps.iter().map(|e| e / sum).collect()
            };

            for o in 0..p.o {
                let mut acc = 0.0f32;
                for (n, prob) in probs.iter().enumerate() {
                    acc += prob * ops.second_input(group.b1[b1_base + at(layouts.b1, p.stride_b1, n, o)]);
                }
                let d: Vec<f32> = p
                    .ds
                    .iter()
                    .zip(&group.ds)
                    .filter_map(|(perm, data)| perm.as_ref().map(|perm| data[output_offset(perm, batch, m, o)]))
                    .collect();
                c[output_offset(out, batch, m, o)] = ops.output(acc, &d);
            }
        }
    }
    c
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance * (1.0 + e.abs()),
            "element {}: got {}, expected {}",
            i,
            a,
            e
        );
    }
}
