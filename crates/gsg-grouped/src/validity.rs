use gsg_tensor::{AcceleratorGeneration, DeviceMemory};

use crate::argument::GroupShape;
use crate::config::TileConfig;
use crate::error::{GroupedGemmError, Result, UnsupportedReason};
use crate::problem::{Operand, OperandLayouts};

/// Which loop body the launch is specialised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainLoop {
    /// K spans more than one `K_PER_BLOCK` step.
    Required,
    /// K fits in a single step.
    NotRequired,
}

impl MainLoop {
    pub fn from_flag(has_main_k_block_loop: bool) -> Self {
        if has_main_k_block_loop {
            MainLoop::Required
        } else {
            MainLoop::NotRequired
        }
    }

    pub fn has_main_k_block_loop(&self) -> bool {
        matches!(self, MainLoop::Required)
    }
}

pub fn calculate_has_main_k_block_loop<C: TileConfig>(k_padded: usize) -> bool {
    k_padded / C::K_PER_BLOCK > 1
}

/// Check that every group can run on `generation` with tile config `C`.
///
/// Returns the loop specialisation shared by all groups.
pub fn check_support<C: TileConfig>(
    generation: AcceleratorGeneration,
    shapes: &[GroupShape],
) -> std::result::Result<MainLoop, UnsupportedReason> {
    if !C::SUPPORTED_GENERATIONS.contains(&generation) {
        return Err(UnsupportedReason::Generation(generation));
    }

    let mut main_loop: Option<bool> = None;
    for (group, shape) in shapes.iter().enumerate() {
        let p = &shape.problem;

        if shape.c_m() != p.m {
            return Err(UnsupportedReason::ShapeMismatch {
                group,
                dim: "M",
                output: shape.c_m(),
                operand: p.m,
            });
        }
        if shape.c_o() != p.o {
            return Err(UnsupportedReason::ShapeMismatch {
                group,
                dim: "O",
                output: shape.c_o(),
                operand: p.o,
            });
        }
        if shape.c_batch_count() != p.batch_count {
            return Err(UnsupportedReason::BatchMismatch {
                group,
                output: shape.c_batch_count(),
                batch: p.batch_count,
            });
        }

        for (operand, d) in Operand::AUX.iter().zip(&p.ds) {
            let Some(d) = d else { continue };
            let same_split = d.num_g() == p.output.num_g()
                && d.num_m() == p.output.num_m()
                && d.num_o() == p.output.num_o();
            if !same_split || d.lengths() != p.output.lengths() {
                return Err(UnsupportedReason::AuxShapeMismatch {
                    group,
                    operand: *operand,
                    expected: p.output.lengths().to_vec(),
                    got: d.lengths().to_vec(),
                });
            }
        }

        let has_main = calculate_has_main_k_block_loop::<C>(shape.extents.padded.k);
        match main_loop {
            None => main_loop = Some(has_main),
            Some(expected) if expected != has_main => {
                return Err(UnsupportedReason::MixedMainLoop {
                    group,
                    expected,
                    got: has_main,
                });
            }
            Some(_) => {}
        }

        let vectors = [
            (Operand::A, C::A_LAYOUT.lowest_extent(p.m, p.k), C::A_SCALAR_PER_VECTOR),
            (Operand::B0, C::B_LAYOUT.lowest_extent(p.k, p.n), C::B_SCALAR_PER_VECTOR),
            (Operand::B1, C::B1_LAYOUT.lowest_extent(p.n, p.o), C::B1_SCALAR_PER_VECTOR),
            (Operand::C, shape.c_lowest_length(), C::C_SCALAR_PER_VECTOR),
        ];
        for (operand, extent, vector) in vectors {
            if extent % vector != 0 {
                return Err(UnsupportedReason::VectorWidth {
                    group,
                    operand,
                    extent,
                    vector,
                });
            }
        }

        if shape.c_lowest_stride() != 1 {
            return Err(UnsupportedReason::OutputStride {
                group,
                stride: shape.c_lowest_stride(),
            });
        }

        let padded = shape.extents.padded;
        let tiles = [
            ("M", padded.m, C::M_PER_BLOCK),
            ("N", padded.n, C::N_PER_BLOCK),
            ("K", padded.k, C::K_PER_BLOCK),
            ("O", padded.o, C::GEMM1_N_PER_BLOCK),
            ("N", padded.n, C::GEMM1_K_PER_BLOCK),
        ];
        for (dim, padded, tile) in tiles {
            if padded % tile != 0 {
                return Err(UnsupportedReason::TileDivisibility {
                    group,
                    dim,
                    padded,
                    tile,
                });
            }
        }
    }

    Ok(MainLoop::from_flag(main_loop.unwrap_or(false)))
}

/// Check that every operand buffer of every group holds all the elements the
/// group addresses, so a launch cannot fail after writing part of its output.
pub fn check_buffers<C: TileConfig>(memory: &DeviceMemory, shapes: &[GroupShape]) -> Result<()> {
    let layouts = OperandLayouts::of::<C>();
    let operands = [Operand::A, Operand::B0, Operand::B1, Operand::C, Operand::D0, Operand::D1];
    for (group, shape) in shapes.iter().enumerate() {
        for operand in operands {
            let Some(ptr) = shape.pointers.get(operand) else {
                continue;
            };
            let required = shape.problem.required_elements(operand, layouts);
            if required == 0 {
                continue;
            }
            let available = memory.remaining(ptr)?;
            if available < required {
                return Err(GroupedGemmError::BufferTooSmall {
                    group,
                    operand,
                    required,
                    available,
                });
            }
        }
    }
    Ok(())
}

/// Boolean form of [`check_support`]. The reason is logged at debug level.
pub fn is_supported<C: TileConfig>(generation: AcceleratorGeneration, shapes: &[GroupShape]) -> bool {
    match check_support::<C>(generation, shapes) {
        Ok(_) => true,
        Err(reason) => {
            log::debug!("argument not supported: {}", reason);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fp32Tile64x64x32;

    type Cfg = Fp32Tile64x64x32;

    #[test]
    fn test_main_loop_flag() {
        assert!(!calculate_has_main_k_block_loop::<Cfg>(0));
        assert!(!calculate_has_main_k_block_loop::<Cfg>(32));
        assert!(calculate_has_main_k_block_loop::<Cfg>(64));
        assert!(MainLoop::from_flag(true).has_main_k_block_loop());
        assert!(!MainLoop::from_flag(false).has_main_k_block_loop());
    }

    #[test]
    fn test_generation_gate() {
        assert!(check_support::<Cfg>(AcceleratorGeneration::Gfx90a, &[]).is_ok());
        assert_eq!(
            check_support::<Cfg>(AcceleratorGeneration::Gfx1100, &[]),
            Err(UnsupportedReason::Generation(AcceleratorGeneration::Gfx1100))
        );
    }
}
