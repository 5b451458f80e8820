use std::marker::PhantomData;
use std::ops::Range;

use gsg_ops::{ElementwisePipeline, MAX_D_TENSORS};
use gsg_tensor::{DevicePtr, DeviceWorkspace, TensorDescriptor};

use crate::config::TileConfig;
use crate::error::{GroupedGemmError, Result};
use crate::grid::{self, BlockToTileMap};
use crate::mask::BoundaryMask;
use crate::padder::{Extents, PaddedExtents};
use crate::problem::{Operand, ProblemDescriptor};

/// Base pointers of one group's operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPointers {
    pub a: DevicePtr,
    pub b0: DevicePtr,
    pub b1: DevicePtr,
    pub c: DevicePtr,
    /// Auxiliary tensors for the output operator, by slot.
    pub ds: [Option<DevicePtr>; MAX_D_TENSORS],
}

impl GroupPointers {
    pub fn new(a: DevicePtr, b0: DevicePtr, b1: DevicePtr, c: DevicePtr) -> Self {
        GroupPointers {
            a,
            b0,
            b1,
            c,
            ds: [None; MAX_D_TENSORS],
        }
    }

    pub fn with_d0(mut self, d0: DevicePtr) -> Self {
        self.ds[0] = Some(d0);
        self
    }

    pub fn with_d1(mut self, d1: DevicePtr) -> Self {
        self.ds[1] = Some(d1);
        self
    }

    /// Pointer for `operand`, if the group has one.
    pub fn get(&self, operand: Operand) -> Option<DevicePtr> {
        match operand {
            Operand::A => Some(self.a),
            Operand::B0 => Some(self.b0),
            Operand::B1 => Some(self.b1),
            Operand::C => Some(self.c),
            Operand::D0 => self.ds[0],
            Operand::D1 => self.ds[1],
        }
    }
}

/// Map the present slots of an auxiliary array, failing on the first error.
fn map_ds<T, U>(
    ds: &[Option<T>; MAX_D_TENSORS],
    mut f: impl FnMut(&T) -> Result<U>,
) -> Result<[Option<U>; MAX_D_TENSORS]> {
    let mut out: [Option<U>; MAX_D_TENSORS] = Default::default();
    for (slot, d) in ds.iter().enumerate() {
        if let Some(d) = d {
            out[slot] = Some(f(d)?);
        }
    }
    Ok(out)
}

/// Per-batch address computation for one group.
///
/// Inputs advance by a plain batch stride. The output start, and the start
/// of each auxiliary tensor, is looked up through a `[G, M, O]` descriptor so
/// any permutation is honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOffsets {
    pub batch_stride_a: usize,
    pub batch_stride_b0: usize,
    pub batch_stride_b1: usize,
    pub c_batch: TensorDescriptor,
    pub d_batch: [Option<TensorDescriptor>; MAX_D_TENSORS],
}

impl BatchOffsets {
    pub fn c_offset(&self, batch_index: usize) -> Result<usize> {
        Ok(self.c_batch.calculate_offset(&[batch_index, 0, 0])?)
    }

    /// The base pointers moved to batch `batch_index`.
    pub fn apply(&self, base: GroupPointers, batch_index: usize) -> Result<GroupPointers> {
        let mut ds = [None; MAX_D_TENSORS];
        for (slot, d) in ds.iter_mut().enumerate() {
            if let (Some(ptr), Some(batch)) = (base.ds[slot], &self.d_batch[slot]) {
                *d = Some(ptr.add(batch.calculate_offset(&[batch_index, 0, 0])?));
            }
        }
        Ok(GroupPointers {
            a: base.a.add(batch_index * self.batch_stride_a),
            b0: base.b0.add(batch_index * self.batch_stride_b0),
            b1: base.b1.add(batch_index * self.batch_stride_b1),
            c: base.c.add(self.c_offset(batch_index)?),
            ds,
        })
    }
}

/// Everything a block needs to find and compute its tile. Built on the
/// host, uploaded once, read-only during the launch.
#[derive(Debug, Clone)]
pub struct GroupMetadata {
    pub pointers: GroupPointers,
    /// `[AK0, M, AK1]`
    pub a_grid: TensorDescriptor,
    /// `[BK0, N, BK1]`
    pub b0_grid: TensorDescriptor,
    /// `[B1K0, O, B1K1]`
    pub b1_grid: TensorDescriptor,
    /// `[MBlock, MPerBlock, OBlock, OPerBlock]`
    pub c_grid: TensorDescriptor,
    /// Auxiliary tensors, tiled like `c_grid`.
    pub d_grids: [Option<TensorDescriptor>; MAX_D_TENSORS],
    pub tile_map: BlockToTileMap,
    pub blocks_per_batch: usize,
    pub batch_offsets: BatchOffsets,
    pub mask: BoundaryMask,
    pub block_start: usize,
    pub block_end: usize,
}

impl GroupMetadata {
    pub fn block_range(&self) -> Range<usize> {
        self.block_start..self.block_end
    }
}

/// Host-side record of a group's shape, used for validation and reporting.
#[derive(Debug, Clone)]
pub struct GroupShape {
    pub problem: ProblemDescriptor,
    pub pointers: GroupPointers,
    pub extents: PaddedExtents,
    /// Unpadded `M x O` output view.
    pub c_raw: TensorDescriptor,
}

impl GroupShape {
    /// Output rows as derived from the output permutation.
    pub fn c_m(&self) -> usize {
        self.c_raw.length(0)
    }

    /// Output columns as derived from the output permutation.
    pub fn c_o(&self) -> usize {
        self.c_raw.length(1)
    }

    pub fn c_lowest_length(&self) -> usize {
        self.problem.output.lowest_length()
    }

    pub fn c_lowest_stride(&self) -> usize {
        self.problem.output.lowest_stride()
    }

    pub fn c_batch_count(&self) -> usize {
        self.problem.output.batch_count()
    }
}

/// A grouped dispatch: per-group metadata, the flat grid it spans, the
/// elementwise operators and the workspace the metadata is uploaded to.
#[derive(Debug, Clone)]
pub struct GroupedArgument<C, P> {
    groups: Vec<GroupMetadata>,
    shapes: Vec<GroupShape>,
    grid_size: usize,
    ops: P,
    workspace: Option<DeviceWorkspace<GroupMetadata>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: TileConfig, P: ElementwisePipeline> GroupedArgument<C, P> {
    /// Build the metadata for every group, in submission order.
    ///
    /// Block ranges are assigned contiguously: group `i` owns
    /// `[block_start, block_start + tiles * batches)` and the next group
    /// starts where it ends.
    pub fn new(pointers: &[GroupPointers], problems: &[ProblemDescriptor], ops: P) -> Result<Self> {
        if pointers.len() != problems.len() {
            return Err(GroupedGemmError::GroupCountMismatch {
                pointers: pointers.len(),
                problems: problems.len(),
            });
        }

        if P::NUM_D > MAX_D_TENSORS {
            return Err(GroupedGemmError::InvalidProblem(format!(
                "output operator reads {} auxiliary tensors, at most {} supported",
                P::NUM_D,
                MAX_D_TENSORS
            )));
        }

        let padder = C::padder();
        let mut groups = Vec::with_capacity(problems.len());
        let mut shapes = Vec::with_capacity(problems.len());
        let mut grid_size = 0usize;

        for (i, (ptrs, problem)) in pointers.iter().zip(problems).enumerate() {
            for (slot, operand) in Operand::AUX.iter().enumerate() {
                let wanted = slot < P::NUM_D;
                let has_ptr = ptrs.ds[slot].is_some();
                let has_desc = problem.ds[slot].is_some();
                if has_ptr != wanted || has_desc != wanted {
                    return Err(GroupedGemmError::InvalidProblem(format!(
                        "group {}: output operator reads {} auxiliary tensors but {} has pointer: {}, descriptor: {}",
                        i,
                        P::NUM_D,
                        operand,
                        has_ptr,
                        has_desc
                    )));
                }
            }

            let a_grid = grid::make_a_grid_descriptor::<C>(problem)?;
            let b0_grid = grid::make_b0_grid_descriptor::<C>(problem)?;
            let b1_grid = grid::make_b1_grid_descriptor::<C>(problem)?;
            let c_padded = grid::make_c_grid_descriptor::<C>(&problem.output)?;
            let c_grid = grid::make_c_tile_descriptor::<C>(&c_padded)?;
            let c_raw = grid::make_c_raw_descriptor(&problem.output)?;
            let c_batch = grid::make_c_batch_descriptor(&problem.output)?;
            let d_grids = map_ds(&problem.ds, |d| {
                let padded = grid::make_c_grid_descriptor::<C>(d)?;
                grid::make_c_tile_descriptor::<C>(&padded)
            })?;
            let d_batch = map_ds(&problem.ds, grid::make_c_batch_descriptor)?;

            let tile_map = BlockToTileMap::for_config::<C>(&c_padded);
            let blocks_per_batch = tile_map.tile_count();
            let blocks = blocks_per_batch * problem.batch_count;
            let block_start = grid_size;
            let block_end = block_start + blocks;
            grid_size = block_end;

            log::debug!(
                "group {}: M={} N={} K={} O={} batch={} tiles={} blocks [{}, {})",
                i,
                problem.m,
                problem.n,
                problem.k,
                problem.o,
                problem.batch_count,
                blocks_per_batch,
                block_start,
                block_end
            );

            groups.push(GroupMetadata {
                pointers: *ptrs,
                a_grid,
                b0_grid,
                b1_grid,
                c_grid,
                d_grids,
                tile_map,
                blocks_per_batch,
                batch_offsets: BatchOffsets {
                    batch_stride_a: problem.batch_stride_a,
                    batch_stride_b0: problem.batch_stride_b0,
                    batch_stride_b1: problem.batch_stride_b1,
                    c_batch,
                    d_batch,
                },
                mask: BoundaryMask::new(problem.n, C::MASK_OUT_UPPER_TRIANGLE),
                block_start,
                block_end,
            });
            shapes.push(GroupShape {
                problem: problem.clone(),
                pointers: *ptrs,
                extents: padder.padded_extents(Extents {
                    m: problem.m,
                    n: problem.n,
                    k: problem.k,
                    o: problem.o,
                }),
                c_raw,
            });
        }

        log::debug!("{} groups, grid size {}", groups.len(), grid_size);

        Ok(GroupedArgument {
            groups,
            shapes,
            grid_size,
            ops,
            workspace: None,
            _config: PhantomData,
        })
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[GroupMetadata] {
        &self.groups
    }

    pub fn shapes(&self) -> &[GroupShape] {
        &self.shapes
    }

    pub fn ops(&self) -> &P {
        &self.ops
    }

    /// Bytes of workspace the metadata table needs.
    pub fn workspace_size(&self) -> usize {
        self.group_count() * std::mem::size_of::<GroupMetadata>()
    }

    pub fn set_workspace(&mut self, workspace: DeviceWorkspace<GroupMetadata>) {
        self.workspace = Some(workspace);
    }

    pub fn workspace(&self) -> Option<&DeviceWorkspace<GroupMetadata>> {
        self.workspace.as_ref()
    }

    /// Copy the metadata table into the attached workspace and return the
    /// uploaded copy.
    pub(crate) fn upload_metadata(&mut self) -> Result<&[GroupMetadata]> {
        let needed = self.workspace_size();
        let workspace = self
            .workspace
            .as_mut()
            .ok_or(GroupedGemmError::WorkspaceNotSet { needed })?;
        workspace.upload(&self.groups)?;
        workspace.contents().ok_or_else(|| {
            GroupedGemmError::InternalConsistency("workspace empty after upload".to_string())
        })
    }

    /// Floating-point operations of the whole dispatch, counting both
    /// products as multiply-adds.
    pub fn total_flops(&self) -> usize {
        self.shapes
            .iter()
            .map(|s| {
                let p = &s.problem;
                p.batch_count * (2 * p.m * p.n * p.k + 2 * p.m * p.n * p.o)
            })
            .sum()
    }

    /// Bytes read and written across all operands.
    pub fn total_bytes(&self) -> usize {
        let elem = C::DATA_TYPE.size_in_bytes();
        self.shapes
            .iter()
            .map(|s| {
                let p = &s.problem;
                let outputs = 1 + p.ds.iter().flatten().count();
                p.batch_count * (p.m * p.k + p.k * p.n + p.n * p.o + outputs * p.m * p.o) * elem
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fp32Tile64x64x32;
    use crate::problem::{OperandLayouts, OutputPermutation};
    use gsg_ops::{AddRelu, PassThrough, PipelineOps};
    use gsg_tensor::{DType, DeviceMemory};

    type Cfg = Fp32Tile64x64x32;

    fn pointers(memory: &mut DeviceMemory) -> GroupPointers {
        GroupPointers::new(
            memory.alloc(DType::F32, 1),
            memory.alloc(DType::F32, 1),
            memory.alloc(DType::F32, 1),
            memory.alloc(DType::F32, 1),
        )
    }

    fn bias_ops() -> PipelineOps<PassThrough, PassThrough, PassThrough, PassThrough, AddRelu> {
        PipelineOps::new(PassThrough, PassThrough, PassThrough, PassThrough, AddRelu)
    }

    #[test]
    fn test_group_count_mismatch() {
        let mut memory = DeviceMemory::new();
        let ptrs = [pointers(&mut memory)];
        let p = ProblemDescriptor::packed(64, 64, 32, 64, 1, OperandLayouts::of::<Cfg>()).unwrap();
        let err = GroupedArgument::<Cfg, _>::new(&ptrs, &[p.clone(), p], PipelineOps::pass_through())
            .unwrap_err();
        assert!(matches!(
            err,
            GroupedGemmError::GroupCountMismatch { pointers: 1, problems: 2 }
        ));
    }

    #[test]
    fn test_ranges_and_flops() {
        let mut memory = DeviceMemory::new();
        let layouts = OperandLayouts::of::<Cfg>();
        let ptrs = [pointers(&mut memory), pointers(&mut memory)];
        let problems = [
            ProblemDescriptor::packed(100, 40, 32, 64, 2, layouts).unwrap(),
            ProblemDescriptor::packed(64, 64, 32, 128, 3, layouts).unwrap(),
        ];
        let arg = GroupedArgument::<Cfg, _>::new(&ptrs, &problems, PipelineOps::pass_through()).unwrap();
        // group 0: 2 x 1 tiles x 2 batches, group 1: 1 x 2 tiles x 3 batches
        assert_eq!(arg.groups()[0].block_range(), 0..4);
        assert_eq!(arg.groups()[1].block_range(), 4..10);
        assert_eq!(arg.grid_size(), 10);
        assert_eq!(arg.shapes()[0].extents.padded.m, 128);
        assert_eq!(arg.shapes()[0].c_m(), 100);
        assert_eq!(arg.shapes()[1].c_o(), 128);

        let flops = 2 * (2 * 100 * 40 * 32 + 2 * 100 * 40 * 64) + 3 * (2 * 64 * 64 * 32 + 2 * 64 * 64 * 128);
        assert_eq!(arg.total_flops(), flops);
        let bytes = 4 * (2 * (100 * 32 + 32 * 40 + 40 * 64 + 100 * 64) + 3 * (64 * 32 + 32 * 64 + 64 * 128 + 64 * 128));
        assert_eq!(arg.total_bytes(), bytes);
    }

    #[test]
    fn test_batch_offsets_follow_permutation() {
        let mut memory = DeviceMemory::new();
        let base = pointers(&mut memory);
        let layouts = OperandLayouts::of::<Cfg>();
        let out = OutputPermutation::with_memory_order(&[2, 3], &[16], &[8], &[0, 2, 1, 3]).unwrap();
        let problem = ProblemDescriptor::packed(16, 16, 8, 8, 6, layouts).unwrap().with_output(out);
        let arg = GroupedArgument::<Cfg, _>::new(&[base], &[problem], PipelineOps::pass_through()).unwrap();
        let offsets = &arg.groups()[0].batch_offsets;

        let moved = offsets.apply(base, 4).unwrap();
        assert_eq!(moved.a.offset(), 4 * 16 * 8);
        assert_eq!(moved.b0.offset(), 4 * 8 * 16);
        assert_eq!(moved.b1.offset(), 4 * 16 * 8);
        // batch 4 = (1, 1): 1 * (16 * 3 * 8) + 1 * 8
        assert_eq!(moved.c.offset(), 384 + 8);
        assert_eq!(moved.c.buffer(), base.c.buffer());
        assert_eq!(moved.ds, [None, None]);
    }

    #[test]
    fn test_aux_tensors_follow_their_own_strides() {
        let mut memory = DeviceMemory::new();
        let bias_ptr = memory.alloc(DType::F32, 8);
        let base = pointers(&mut memory).with_d0(bias_ptr);
        let layouts = OperandLayouts::of::<Cfg>();
        // Per-batch bias over O, broadcast across rows.
        let bias = OutputPermutation::new(vec![6, 16, 8], vec![8, 0, 1], 1, 1, 1).unwrap();
        let problem = ProblemDescriptor::packed(16, 16, 8, 8, 6, layouts).unwrap().with_d0(bias);
        let arg = GroupedArgument::<Cfg, _>::new(&[base], &[problem], bias_ops()).unwrap();
        let meta = &arg.groups()[0];
        assert!(meta.d_grids[0].is_some());
        assert!(meta.d_grids[1].is_none());

        let moved = meta.batch_offsets.apply(base, 3).unwrap();
        assert_eq!(moved.ds[0], Some(bias_ptr.add(24)));
        assert_eq!(moved.ds[1], None);
        assert_eq!(moved.c.offset(), 3 * 16 * 8);
    }

    #[test]
    fn test_aux_presence_must_match_operator() {
        let mut memory = DeviceMemory::new();
        let layouts = OperandLayouts::of::<Cfg>();
        let bias = OutputPermutation::packed(&[1], &[64], &[64]).unwrap();
        let problem = ProblemDescriptor::packed(64, 64, 32, 64, 1, layouts).unwrap();
        let bare = pointers(&mut memory);
        let with_bias = bare.with_d0(memory.alloc(DType::F32, 64 * 64));

        // Operator reads D0 but the group supplies nothing.
        let err = GroupedArgument::<Cfg, _>::new(&[bare], &[problem.clone()], bias_ops()).unwrap_err();
        assert!(matches!(err, GroupedGemmError::InvalidProblem(_)));

        // Pointer without a descriptor.
        let err = GroupedArgument::<Cfg, _>::new(&[with_bias], &[problem.clone()], bias_ops()).unwrap_err();
        assert!(matches!(err, GroupedGemmError::InvalidProblem(_)));

        // Operator reads nothing but D0 is supplied.
        let err = GroupedArgument::<Cfg, _>::new(
            &[with_bias],
            &[problem.clone().with_d0(bias.clone())],
            PipelineOps::pass_through(),
        )
        .unwrap_err();
        assert!(matches!(err, GroupedGemmError::InvalidProblem(_)));

        assert!(GroupedArgument::<Cfg, _>::new(&[with_bias], &[problem.with_d0(bias)], bias_ops()).is_ok());
    }

    #[test]
    fn test_workspace_required_for_upload() {
        let mut memory = DeviceMemory::new();
        let ptrs = [pointers(&mut memory)];
        let p = ProblemDescriptor::packed(64, 64, 32, 64, 1, OperandLayouts::of::<Cfg>()).unwrap();
        let mut arg = GroupedArgument::<Cfg, _>::new(&ptrs, &[p], PipelineOps::pass_through()).unwrap();
        assert_eq!(arg.workspace_size(), std::mem::size_of::<GroupMetadata>());
        assert!(matches!(
            arg.upload_metadata(),
            Err(GroupedGemmError::WorkspaceNotSet { .. })
        ));

        arg.set_workspace(DeviceWorkspace::with_capacity_bytes(arg.workspace_size()));
        assert_eq!(arg.upload_metadata().unwrap().len(), 1);
    }
}
