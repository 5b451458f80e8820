//! `gsg-tensor` - Tensor descriptors and device memory for the grouped softmax-gemm runtime.
//!
//! This crate provides:
//! - A coordinate-transform algebra (`TensorDescriptor`, `Transform`) that maps
//!   logical multi-indices onto linear memory offsets
//! - Shape and matrix layout utilities
//! - Data type definitions (F32, F16, BF16)
//! - An emulated accelerator: typed device buffers, device pointers, and the
//!   read-only workspace used to hand host-built metadata to a launch

pub mod descriptor;
pub mod device;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;

// Re-export primary types at the crate root for convenience.
pub use descriptor::{TensorDescriptor, Transform};
pub use device::{AcceleratorGeneration, Device, DeviceMemory, DevicePtr, DeviceWorkspace};
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use layout::MatrixLayout;
pub use shape::Shape;
