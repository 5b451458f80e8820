use std::marker::PhantomData;
use std::time::Instant;

use gsg_ops::ElementwisePipeline;
use gsg_tensor::{Device, DeviceMemory};

use crate::argument::{GroupMetadata, GroupShape, GroupedArgument};
use crate::config::{BlockOrder, StreamConfig, TileConfig};
use crate::device_op::type_string;
use crate::engine::{AuxOperand, TileArgs, TileEngine};
use crate::error::{GroupedGemmError, Result};
use crate::resolver::resolve_block;
use crate::validity::{calculate_has_main_k_block_loop, check_buffers, check_support};

/// Launches a grouped argument on an emulated device.
#[derive(Debug)]
pub struct Invoker<'a, C, E> {
    engine: &'a E,
    _config: PhantomData<fn() -> C>,
}

impl<'a, C: TileConfig, E: TileEngine<C>> Invoker<'a, C, E> {
    pub fn new(engine: &'a E) -> Self {
        Invoker {
            engine,
            _config: PhantomData,
        }
    }

    /// Validate, upload the metadata table, and launch the whole grid.
    ///
    /// Every check runs before the first block, so a rejected argument
    /// leaves device memory untouched.
    ///
    /// Returns the average launch time in milliseconds when
    /// `config.time_kernel` is set, otherwise `0.0`.
    pub fn run<P: ElementwisePipeline>(
        &self,
        device: &mut Device,
        arg: &mut GroupedArgument<C, P>,
        config: &StreamConfig,
    ) -> Result<f32> {
        let main_loop = check_support::<C>(device.generation(), arg.shapes()).map_err(|reason| {
            log::debug!("refusing to launch: {}", reason);
            GroupedGemmError::Unsupported(reason)
        })?;
        let has_main_k_loop = uniform_main_loop::<C>(arg.shapes())?;
        if has_main_k_loop != main_loop.has_main_k_block_loop() {
            return Err(GroupedGemmError::InternalConsistency(
                "launch loop flag disagrees with validation".to_string(),
            ));
        }
        check_buffers::<C>(device.memory(), arg.shapes()).map_err(|e| {
            log::debug!("refusing to launch: {}", e);
            e
        })?;

        let grid_size = arg.grid_size();
        let flops = arg.total_flops();
        let bytes = arg.total_bytes();
        let ops = *arg.ops();
        let table = arg.upload_metadata()?;

        if !config.time_kernel {
            self.dispatch(device.memory_mut(), table, &ops, grid_size, config.block_order, has_main_k_loop)?;
            return Ok(0.0);
        }

        for _ in 0..config.cold_iterations {
            self.dispatch(device.memory_mut(), table, &ops, grid_size, config.block_order, has_main_k_loop)?;
        }
        let iterations = config.timed_iterations.max(1);
        let start = Instant::now();
        for _ in 0..iterations {
            self.dispatch(device.memory_mut(), table, &ops, grid_size, config.block_order, has_main_k_loop)?;
        }
        let ms = start.elapsed().as_secs_f32() * 1e3 / iterations as f32;

        let tflops = if ms > 0.0 { flops as f32 / 1e9 / ms } else { 0.0 };
        let gb_per_sec = if ms > 0.0 { bytes as f32 / 1e6 / ms } else { 0.0 };
        log::info!(
            "Perf: {:.4} ms, {:.3} TFlops, {:.3} GB/s, {}",
            ms,
            tflops,
            gb_per_sec,
            type_string::<C>()
        );
        Ok(ms)
    }

    fn dispatch<P: ElementwisePipeline>(
        &self,
        memory: &mut DeviceMemory,
        table: &[GroupMetadata],
        ops: &P,
        grid_size: usize,
        order: BlockOrder,
        has_main_k_loop: bool,
    ) -> Result<()> {
        if has_main_k_loop {
            self.launch::<true, P>(memory, table, ops, grid_size, order)
        } else {
            self.launch::<false, P>(memory, table, ops, grid_size, order)
        }
    }

    fn launch<const HAS_MAIN_K_LOOP: bool, P: ElementwisePipeline>(
        &self,
        memory: &mut DeviceMemory,
        table: &[GroupMetadata],
        ops: &P,
        grid_size: usize,
        order: BlockOrder,
    ) -> Result<()> {
        log::debug!(
            "launching {} blocks over {} groups (main K loop: {}, {:?})",
            grid_size,
            table.len(),
            HAS_MAIN_K_LOOP,
            order
        );
        let blocks: Box<dyn Iterator<Item = usize>> = match order {
            BlockOrder::Ascending => Box::new(0..grid_size),
            BlockOrder::Descending => Box::new((0..grid_size).rev()),
        };

        for block in blocks {
            let assignment = resolve_block(table, block).ok_or_else(|| {
                GroupedGemmError::InternalConsistency(format!("block {} has no owning group", block))
            })?;
            let meta = &table[assignment.group];
            let ptrs = meta.batch_offsets.apply(meta.pointers, assignment.batch_index)?;
            let ds = std::array::from_fn(|slot| match (ptrs.ds[slot], &meta.d_grids[slot]) {
                (Some(ptr), Some(grid)) => Some(AuxOperand { ptr, grid }),
                _ => None,
            });
            let (m_block, o_block) = meta.tile_map.tile_coordinates(assignment.tile_index);
            log::trace!(
                "block {} -> group {} batch {} tile ({}, {})",
                block,
                assignment.group,
                assignment.batch_index,
                m_block,
                o_block
            );

            let args = TileArgs {
                a: ptrs.a,
                b0: ptrs.b0,
                b1: ptrs.b1,
                c: ptrs.c,
                a_grid: &meta.a_grid,
                b0_grid: &meta.b0_grid,
                b1_grid: &meta.b1_grid,
                c_grid: &meta.c_grid,
                ds,
                mask: meta.mask,
                m_block,
                o_block,
            };
            <E as TileEngine<C>>::run_tile::<HAS_MAIN_K_LOOP, P>(self.engine, memory, &args, ops)?;
        }
        Ok(())
    }
}

/// The loop flag shared by every group. A mixture cannot be launched.
fn uniform_main_loop<C: TileConfig>(shapes: &[GroupShape]) -> Result<bool> {
    let flags = shapes
        .iter()
        .map(|s| calculate_has_main_k_block_loop::<C>(s.extents.padded.k));
    let (all, any) = flags.fold((true, false), |(all, any), f| (all && f, any || f));
    if shapes.is_empty() || !any {
        Ok(false)
    } else if all {
        Ok(true)
    } else {
        Err(GroupedGemmError::InternalConsistency(
            "groups disagree on the main K loop".to_string(),
        ))
    }
}
