use std::marker::PhantomData;

use gsg_ops::ElementwisePipeline;
use gsg_tensor::Device;

use crate::argument::{GroupPointers, GroupedArgument};
use crate::config::{StreamConfig, TileConfig};
use crate::engine::TileEngine;
use crate::error::Result;
use crate::invoker::Invoker;
use crate::problem::ProblemDescriptor;
use crate::validity;

/// Interface shared by device operation instances.
pub trait DeviceOp {
    type Argument;

    /// Whether `arg` can run on `device` with this instance.
    fn is_supported_argument(&self, device: &Device, arg: &Self::Argument) -> bool;

    /// Workspace bytes `arg` needs attached before `run`.
    fn workspace_size(&self, arg: &Self::Argument) -> usize;

    /// Run `arg` to completion. Returns the average elapsed milliseconds when
    /// timing is enabled, otherwise `0.0`.
    fn run(&self, device: &mut Device, arg: &mut Self::Argument, config: &StreamConfig) -> Result<f32>;

    fn type_string(&self) -> String;
}

/// Grouped `C = out(softmax(mask(acc(A·B0)))·B1)` for tile config `C`,
/// tile engine `E` and elementwise pipeline `P`.
#[derive(Debug, Clone)]
pub struct DeviceGroupedGemmSoftmaxGemm<C, E, P> {
    engine: E,
    _marker: PhantomData<fn() -> (C, P)>,
}

impl<C: TileConfig, E: TileEngine<C>, P: ElementwisePipeline> DeviceGroupedGemmSoftmaxGemm<C, E, P> {
    pub fn new(engine: E) -> Self {
        DeviceGroupedGemmSoftmaxGemm {
            engine,
            _marker: PhantomData,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn make_argument(
        &self,
        pointers: &[GroupPointers],
        problems: &[ProblemDescriptor],
        ops: P,
    ) -> Result<GroupedArgument<C, P>> {
        GroupedArgument::new(pointers, problems, ops)
    }

    pub fn make_invoker(&self) -> Invoker<'_, C, E> {
        Invoker::new(&self.engine)
    }
}

impl<C: TileConfig, E: TileEngine<C>, P: ElementwisePipeline> DeviceOp
    for DeviceGroupedGemmSoftmaxGemm<C, E, P>
{
    type Argument = GroupedArgument<C, P>;

    fn is_supported_argument(&self, device: &Device, arg: &Self::Argument) -> bool {
        if !validity::is_supported::<C>(device.generation(), arg.shapes()) {
            return false;
        }
        match validity::check_buffers::<C>(device.memory(), arg.shapes()) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("argument not supported: {}", e);
                false
            }
        }
    }

    fn workspace_size(&self, arg: &Self::Argument) -> usize {
        arg.workspace_size()
    }

    fn run(&self, device: &mut Device, arg: &mut Self::Argument, config: &StreamConfig) -> Result<f32> {
        self.make_invoker().run(device, arg, config)
    }

    fn type_string(&self) -> String {
        type_string::<C>()
    }
}

/// Identifier of a tile configuration:
/// `<BlockSize, MPerBlock, NPerBlock, KPerBlock, AK1, BK1, MPerBlock,
/// Gemm1NPerBlock, Gemm1KPerBlock, B1K1, Specialization>`.
pub fn type_string<C: TileConfig>() -> String {
    format!(
        "DeviceGroupedGemmSoftmaxGemm<{}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}>",
        C::BLOCK_SIZE,
        C::M_PER_BLOCK,
        C::N_PER_BLOCK,
        C::K_PER_BLOCK,
        C::AK1,
        C::BK1,
        C::M_PER_BLOCK,
        C::GEMM1_N_PER_BLOCK,
        C::GEMM1_K_PER_BLOCK,
        C::B1K1,
        C::SPECIALIZATION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Fp16Tile128x128x32Masked, Fp32Tile64x64x32};
    use crate::cpu::CpuTileEngine;
    use gsg_ops::{PassThrough, PipelineOps};

    type Ops = PipelineOps<PassThrough, PassThrough, PassThrough, PassThrough, PassThrough>;

    #[test]
    fn test_type_string() {
        let op = DeviceGroupedGemmSoftmaxGemm::<Fp16Tile128x128x32Masked, _, Ops>::new(CpuTileEngine::new());
        assert_eq!(
            op.type_string(),
            "DeviceGroupedGemmSoftmaxGemm<256, 128, 128, 32, 8, 8, 128, 64, 32, 2, MNKOPadding>"
        );
        assert_eq!(
            type_string::<Fp32Tile64x64x32>(),
            "DeviceGroupedGemmSoftmaxGemm<256, 64, 64, 32, 4, 4, 64, 64, 32, 2, MNKOPadding>"
        );
    }
}
