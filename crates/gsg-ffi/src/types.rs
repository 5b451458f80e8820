use gsg_grouped::{OutputPermutation, ProblemDescriptor};
use gsg_tensor::{AcceleratorGeneration, DType, DevicePtr};

/// Maximum number of output dims a `GsgProblem` can describe.
pub const GSG_MAX_OUTPUT_DIMS: usize = 8;

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GsgStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorGroupCountMismatch = 2,
    ErrorUnsupported = 3,
    ErrorWorkspace = 4,
    ErrorDevice = 5,
    ErrorInternal = 6,
}

/// Accelerator generation selector.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum GsgGeneration {
    Gfx908 = 0,
    Gfx90a = 1,
    Gfx940 = 2,
    Gfx1030 = 3,
    Gfx1100 = 4,
}

impl From<GsgGeneration> for AcceleratorGeneration {
    fn from(g: GsgGeneration) -> Self {
        match g {
            GsgGeneration::Gfx908 => AcceleratorGeneration::Gfx908,
            GsgGeneration::Gfx90a => AcceleratorGeneration::Gfx90a,
            GsgGeneration::Gfx940 => AcceleratorGeneration::Gfx940,
            GsgGeneration::Gfx1030 => AcceleratorGeneration::Gfx1030,
            GsgGeneration::Gfx1100 => AcceleratorGeneration::Gfx1100,
        }
    }
}

/// Element type of a device buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub enum GsgDType {
    F32 = 0,
    F16 = 1,
    BF16 = 2,
}

impl From<GsgDType> for DType {
    fn from(d: GsgDType) -> Self {
        match d {
            GsgDType::F32 => DType::F32,
            GsgDType::F16 => DType::F16,
            GsgDType::BF16 => DType::BF16,
        }
    }
}

/// Shipped tile configurations.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GsgTileConfig {
    /// fp16, 128x128x32 tiles, causal mask.
    Fp16Tile128x128x32Masked = 0,
    /// fp32, 64x64x32 tiles, no mask.
    Fp32Tile64x64x32 = 1,
}

/// Operand base pointers of one group, as handles from `gsg_buffer_alloc`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GsgGroupPointers {
    pub a: u64,
    pub b0: u64,
    pub b1: u64,
    pub c: u64,
}

impl GsgGroupPointers {
    pub fn to_pointers(&self) -> gsg_grouped::GroupPointers {
        gsg_grouped::GroupPointers::new(
            DevicePtr::from_raw(self.a),
            DevicePtr::from_raw(self.b0),
            DevicePtr::from_raw(self.b1),
            DevicePtr::from_raw(self.c),
        )
    }
}

/// One group's problem. The C ABI exposes no auxiliary output tensors.
///
/// The output is described by `num_g + num_m + num_o` lengths and strides in
/// logical order `[G.., M.., O..]`; entries past that are ignored.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct GsgProblem {
    pub m: u64,
    pub n: u64,
    pub k: u64,
    pub o: u64,
    pub batch_count: u64,
    pub stride_a: u64,
    pub stride_b0: u64,
    pub stride_b1: u64,
    pub batch_stride_a: u64,
    pub batch_stride_b0: u64,
    pub batch_stride_b1: u64,
    pub num_g: u32,
    pub num_m: u32,
    pub num_o: u32,
    pub output_lengths: [u64; GSG_MAX_OUTPUT_DIMS],
    pub output_strides: [u64; GSG_MAX_OUTPUT_DIMS],
}

impl GsgProblem {
    pub fn to_descriptor(&self) -> gsg_grouped::Result<ProblemDescriptor> {
        let rank = (self.num_g + self.num_m + self.num_o) as usize;
        if rank > GSG_MAX_OUTPUT_DIMS {
            return Err(gsg_grouped::GroupedGemmError::InvalidProblem(format!(
                "{} output dims, at most {} supported",
                rank, GSG_MAX_OUTPUT_DIMS
            )));
        }
        let output = OutputPermutation::new(
            self.output_lengths[..rank].iter().map(|&l| l as usize).collect(),
            self.output_strides[..rank].iter().map(|&s| s as usize).collect(),
            self.num_g as usize,
            self.num_m as usize,
            self.num_o as usize,
        )?;
        Ok(ProblemDescriptor {
            m: self.m as usize,
            n: self.n as usize,
            k: self.k as usize,
            o: self.o as usize,
            batch_count: self.batch_count as usize,
            stride_a: self.stride_a as usize,
            stride_b0: self.stride_b0 as usize,
            stride_b1: self.stride_b1 as usize,
            batch_stride_a: self.batch_stride_a as usize,
            batch_stride_b0: self.batch_stride_b0 as usize,
            batch_stride_b1: self.batch_stride_b1 as usize,
            output,
            ds: Default::default(),
        })
    }
}
