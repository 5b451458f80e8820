pub mod softmax;

use gsg_ops::{ElementwisePipeline, MAX_D_TENSORS};
use gsg_tensor::{DeviceMemory, DevicePtr, TensorDescriptor};

use crate::config::TileConfig;
use crate::engine::{TileArgs, TileEngine};
use crate::error::{GroupedGemmError, Result};

/// Pure-Rust reference tile engine.
///
/// Stages the block's B0 and B1 slices the way a device kernel stages them in
/// shared memory, then walks the tile row by row. Accumulation is f32; the
/// softmax probabilities are rounded to the config's data type before the
/// second product.
#[derive(Debug, Clone, Default)]
pub struct CpuTileEngine;

impl CpuTileEngine {
    pub fn new() -> Self {
        CpuTileEngine
    }
}

impl<C: TileConfig> TileEngine<C> for CpuTileEngine {
    fn name(&self) -> &str {
        "cpu"
    }

    fn run_tile<const HAS_MAIN_K_LOOP: bool, P: ElementwisePipeline>(
        &self,
        memory: &mut DeviceMemory,
        args: &TileArgs<'_>,
        ops: &P,
    ) -> Result<()> {
        let [ak0, m_padded, ak1] = dims3(args.a_grid, "A")?;
        let [bk0, n_padded, bk1] = dims3(args.b0_grid, "B0")?;
        let [_, o_padded, b1k1] = dims3(args.b1_grid, "B1")?;

        let k_padded = ak0 * ak1;
        if bk0 * bk1 != k_padded {
            return Err(GroupedGemmError::InternalConsistency(format!(
                "A spans K = {} but B0 spans K = {}",
                k_padded,
                bk0 * bk1
            )));
        }
        let k_blocks = k_padded.div_ceil(C::K_PER_BLOCK);
        if !HAS_MAIN_K_LOOP && k_blocks > 1 {
            return Err(GroupedGemmError::InternalConsistency(format!(
                "{} K blocks launched without a main K loop",
                k_blocks
            )));
        }

        let o_tile = C::GEMM1_N_PER_BLOCK;
        let o_start = args.o_block * o_tile;

        // B0 staged as [k][n].
        let mut b0 = vec![0.0f32; k_padded * n_padded];
        for k in 0..k_padded {
            for n in 0..n_padded {
                let index = [k / bk1, n, k % bk1];
                if let Some(v) = load(memory, args.b0, args.b0_grid, &index)? {
                    b0[k * n_padded + n] = ops.weight(v);
                }
            }
        }

        // This tile's B1 columns staged as [n][o].
        let mut b1 = vec![0.0f32; n_padded * o_tile];
        for n in 0..n_padded {
            for o_in in 0..o_tile {
                let o = o_start + o_in;
                if o >= o_padded {
                    break;
                }
                let index = [n / b1k1, o, n % b1k1];
                if let Some(v) = load(memory, args.b1, args.b1_grid, &index)? {
                    b1[n * o_tile + o_in] = ops.second_input(v);
                }
            }
        }

        let mut d = [0.0f32; MAX_D_TENSORS];
        let mut a_row = vec![0.0f32; k_padded];
        let mut scores = vec![0.0f32; n_padded];
        for m_in in 0..C::M_PER_BLOCK {
            let m = args.m_block * C::M_PER_BLOCK + m_in;
            if m >= m_padded {
                break;
            }

            for (k, slot) in a_row.iter_mut().enumerate() {
                let index = [k / ak1, m, k % ak1];
                *slot = match load(memory, args.a, args.a_grid, &index)? {
                    Some(v) => ops.input(v),
                    None => 0.0,
                };
            }

            for (n, score) in scores.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for kb in 0..k_blocks {
                    let k_end = ((kb + 1) * C::K_PER_BLOCK).min(k_padded);
                    for k in kb * C::K_PER_BLOCK..k_end {
                        acc += a_row[k] * b0[k * n_padded + n];
                    }
                }
                *score = if args.mask.is_masked_element(m, n) {
                    f32::NEG_INFINITY
                } else {
                    ops.acc(acc)
                };
            }

            softmax::masked_softmax(&mut scores);
            for p in scores.iter_mut() {
                *p = C::DATA_TYPE.quantize(*p);
            }

            for o_in in 0..o_tile {
                let index = [args.m_block, m_in, args.o_block, o_in];
                if !args.c_grid.is_valid_index(&index)? {
                    continue;
                }
                let mut out = 0.0f32;
                for (n, &p) in scores.iter().enumerate() {
                    out += p * b1[n * o_tile + o_in];
                }
                let mut num_d = 0;
                for aux in args.ds.iter().flatten() {
                    d[num_d] = memory.load(aux.ptr, aux.grid.calculate_offset(&index)?)?;
                    num_d += 1;
                }
                let offset = args.c_grid.calculate_offset(&index)?;
                memory.store(args.c, offset, ops.output(out, &d[..num_d]))?;
            }
        }

        log::trace!(
            "cpu tile ({}, {}) done: K blocks {}, N {}",
            args.m_block,
            args.o_block,
            k_blocks,
            n_padded
        );
        Ok(())
    }
}

fn dims3(desc: &TensorDescriptor, operand: &str) -> Result<[usize; 3]> {
    match desc.lengths() {
        &[d0, d1, d2] => Ok([d0, d1, d2]),
        other => Err(GroupedGemmError::InternalConsistency(format!(
            "{} grid descriptor has lengths {:?}, expected 3 dims",
            operand, other
        ))),
    }
}

/// Value at `index`, or `None` when the index only addresses padding.
fn load(
    memory: &DeviceMemory,
    ptr: DevicePtr,
    desc: &TensorDescriptor,
    index: &[usize],
) -> Result<Option<f32>> {
    if !desc.is_valid_index(index)? {
        return Ok(None);
    }
    let offset = desc.calculate_offset(index)?;
    Ok(Some(memory.load(ptr, offset)?))
}
