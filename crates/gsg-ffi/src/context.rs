use gsg_grouped::{
    CpuTileEngine, DeviceGroupedGemmSoftmaxGemm, DeviceOp, Fp16Tile128x128x32Masked, Fp32Tile64x64x32,
    GroupPointers, GroupedArgument, ProblemDescriptor, StreamConfig,
};
use gsg_ops::{PassThrough, PipelineOps, Scale};
use gsg_tensor::{AcceleratorGeneration, Device, DeviceWorkspace};

use crate::types::GsgTileConfig;

/// Operators exposed over the C ABI: identity everywhere but a scale on the
/// first product's accumulator.
pub type AttentionOps = PipelineOps<PassThrough, PassThrough, Scale, PassThrough, PassThrough>;

type Fp16Op = DeviceGroupedGemmSoftmaxGemm<Fp16Tile128x128x32Masked, CpuTileEngine, AttentionOps>;
type Fp32Op = DeviceGroupedGemmSoftmaxGemm<Fp32Tile64x64x32, CpuTileEngine, AttentionOps>;

/// Opaque context handle that owns the emulated device.
pub struct GsgContext {
    pub device: Device,
}

impl GsgContext {
    pub fn new(generation: AcceleratorGeneration) -> Self {
        Self {
            device: Device::new(generation),
        }
    }
}

/// Opaque grouped argument handle, bound to one tile configuration.
pub enum GsgArgument {
    Fp16Masked(Fp16Op, GroupedArgument<Fp16Tile128x128x32Masked, AttentionOps>),
    Fp32(Fp32Op, GroupedArgument<Fp32Tile64x64x32, AttentionOps>),
}

impl GsgArgument {
    pub fn new(
        config: GsgTileConfig,
        pointers: &[GroupPointers],
        problems: &[ProblemDescriptor],
        acc_scale: f32,
    ) -> gsg_grouped::Result<Self> {
        let ops = PipelineOps::with_acc(Scale::new(acc_scale));
        Ok(match config {
            GsgTileConfig::Fp16Tile128x128x32Masked => {
                let op = Fp16Op::new(CpuTileEngine::new());
                let arg = op.make_argument(pointers, problems, ops)?;
                GsgArgument::Fp16Masked(op, arg)
            }
            GsgTileConfig::Fp32Tile64x64x32 => {
                let op = Fp32Op::new(CpuTileEngine::new());
                let arg = op.make_argument(pointers, problems, ops)?;
                GsgArgument::Fp32(op, arg)
            }
        })
    }

    pub fn workspace_size(&self) -> usize {
        match self {
            GsgArgument::Fp16Masked(op, arg) => op.workspace_size(arg),
            GsgArgument::Fp32(op, arg) => op.workspace_size(arg),
        }
    }

    pub fn set_workspace(&mut self, capacity_bytes: usize) {
        match self {
            GsgArgument::Fp16Masked(_, arg) => arg.set_workspace(DeviceWorkspace::with_capacity_bytes(capacity_bytes)),
            GsgArgument::Fp32(_, arg) => arg.set_workspace(DeviceWorkspace::with_capacity_bytes(capacity_bytes)),
        }
    }

    pub fn is_supported(&self, device: &Device) -> bool {
        match self {
            GsgArgument::Fp16Masked(op, arg) => op.is_supported_argument(device, arg),
            GsgArgument::Fp32(op, arg) => op.is_supported_argument(device, arg),
        }
    }

    pub fn run(&mut self, device: &mut Device, config: &StreamConfig) -> gsg_grouped::Result<f32> {
        match self {
            GsgArgument::Fp16Masked(op, arg) => op.run(device, arg, config),
            GsgArgument::Fp32(op, arg) => op.run(device, arg, config),
        }
    }

    pub fn type_string(&self) -> String {
        match self {
            GsgArgument::Fp16Masked(op, _) => op.type_string(),
            GsgArgument::Fp32(op, _) => op.type_string(),
        }
    }
}
