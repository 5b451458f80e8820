use half::{bf16, f16};
use std::fmt;

/// Element types an operand buffer can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 16-bit brain floating point (via the `half` crate).
    BF16,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }

    /// Rounds an f32 value to the precision of this dtype.
    ///
    /// Device buffers hold their contents widened to f32; every store goes
    /// through this so that a buffer never carries more precision than its
    /// element type can represent.
    pub fn quantize(&self, value: f32) -> f32 {
        match self {
            DType::F32 => value,
            DType::F16 => f16::from_f32(value).to_f32(),
            DType::BF16 => bf16::from_f32(value).to_f32(),
        }
    }

    /// Parses a short dtype name such as `"f16"`.
    pub fn from_name(name: &str) -> Option<DType> {
        match name {
            "f32" | "fp32" => Some(DType::F32),
            "f16" | "fp16" => Some(DType::F16),
            "bf16" => Some(DType::BF16),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::BF16 => write!(f, "bf16"),
        }
    }
}
